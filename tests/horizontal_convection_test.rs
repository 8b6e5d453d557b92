//! End-to-end horizontal convection runs.

use std::sync::Arc;

use hc_rs::analysis::{diffusive_dissipation, scalar_series};
use hc_rs::io::{Container, list_containers};
use hc_rs::solver::CflConfig;
use hc_rs::{
    Field, RunConfig, SerialCommunicator, Simulation, SolverStatus, StopConditions, WallCondition,
};

/// 2D, Lx = 4, Lz = 1, 64 x 32, Ra = 1e6, Pr = 1, no-slip walls, b = -0.6
/// initially, 200 CFL-limited steps from dt = 0.125.
#[test]
fn test_2d_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RunConfig::default()
        .with_resolution(64, 32)
        .with_rayleigh(1e6)
        .with_walls(WallCondition::NoSlip)
        .with_cfl(CflConfig::default().with_initial_dt(0.125).with_safety(1.0))
        .with_stop(StopConditions::default().with_iteration(200))
        .with_output_dir(dir.path());
    config.output.snapshot_dt = Some(5.0);

    let mut sim = Simulation::new(config, Arc::new(SerialCommunicator::new())).unwrap();
    let mut times = vec![sim.solver().sim_time()];
    let result = sim
        .run_with_callback(|solver| times.push(solver.sim_time()))
        .unwrap();

    assert_eq!(result.status, SolverStatus::Halted);
    assert_eq!(result.n_steps, 200);
    assert!(times.windows(2).all(|w| w[1] >= w[0]));
    assert!(result.dt_max <= 0.125 + 1e-15);
    assert!(result.max_reynolds.unwrap().is_finite());

    let diagnostics = list_containers(dir.path(), "diagnostics").unwrap();
    let ke = scalar_series(&diagnostics, "ke").unwrap();
    assert_eq!(ke.len(), 21);
    for (t, k) in &ke {
        assert!(k.is_finite() && *k >= 0.0, "ke = {} at t = {}", k, t);
    }
    // The surface forcing sets the fluid in motion.
    assert!(ke.last().unwrap().1 > 0.0);

    // Dissipation stays within a sane multiple of the diffusive value.
    let chi = scalar_series(&diagnostics, "chi").unwrap();
    let p = sim.config().physics.model().diffusivity();
    let reference = diffusive_dissipation(p, 4.0, 1.0);
    assert!(chi.iter().all(|(_, c)| c.is_finite() && *c >= 0.0));
    assert!(chi.last().unwrap().1 < 1e3 * reference);

    assert!(!list_containers(dir.path(), "snapshots").unwrap().is_empty());
}

fn grid_max_abs(mut f: Field) -> f64 {
    f.to_grid().unwrap();
    f.grid().unwrap().iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Pointwise divergence stays small against the velocity gradients.
#[test]
fn test_velocity_stays_divergence_free() {
    let mut config = RunConfig::default()
        .with_resolution(32, 32)
        .with_rayleigh(1e5)
        .with_walls(WallCondition::FreeSlip)
        .with_cfl(CflConfig::default().with_initial_dt(0.1).with_max_dt(0.1))
        .with_stop(StopConditions::default().with_iteration(20));
    config.output.snapshot_dt = None;
    config.output.diagnostics_iter = None;

    let mut sim = Simulation::new(config, Arc::new(SerialCommunicator::new())).unwrap();
    let mut worst: f64 = 0.0;
    let mut scale: f64 = 0.0;
    sim.run_with_callback(|solver| {
        let dudx = solver.field("u").unwrap().differentiate(0).unwrap();
        let dwdz = solver.field("w").unwrap().differentiate(1).unwrap();
        let mut div = dudx.clone();
        let sum = dudx
            .coefficients()
            .unwrap()
            .iter()
            .zip(dwdz.coefficients().unwrap())
            .map(|(a, b)| a + b)
            .collect();
        div.set_coefficient_values(sum).unwrap();
        let step_scale = grid_max_abs(dudx);
        if step_scale > 0.0 {
            worst = worst.max(grid_max_abs(div) / step_scale);
        }
        scale = step_scale;
    })
    .unwrap();
    assert!(scale > 1e-8, "flow never started, max |du/dx| = {:e}", scale);
    assert!(worst < 1e-4, "relative divergence {:e}", worst);
}

#[test]
fn test_3d_run_steps() {
    let mut config = RunConfig::for_dim(3).unwrap();
    config.domain.nx = 8;
    config.domain.ny = 4;
    config.domain.nz = 8;
    config.physics.rayleigh = 1e4;
    config.cfl = CflConfig::default().with_initial_dt(0.05).with_max_dt(0.05).with_cadence(4);
    config.stop = StopConditions::default().with_iteration(3);
    config.output.snapshot_dt = None;
    config.output.diagnostics_iter = None;
    config.output.averages_dt = Some(0.05);
    let dir = tempfile::tempdir().unwrap();
    config.output.dir = dir.path().to_path_buf();

    let mut sim = Simulation::new(config, Arc::new(SerialCommunicator::new())).unwrap();
    let result = sim.run().unwrap();
    assert_eq!(result.n_steps, 3);
    assert!(sim.solver().field("v").is_ok());

    let averages = list_containers(dir.path(), "2d_averages").unwrap();
    let c = Container::read(&averages[0]).unwrap();
    assert_eq!(c.header.tasks, ["b", "bz", "u", "w"]);
    assert_eq!(c.records[0].task("bz").unwrap().shape, [8, 1, 8]);
}
