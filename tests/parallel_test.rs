//! Distributed runs must agree with serial ones.

use std::f64::consts::PI;
use std::sync::Arc;

use hc_rs::basis::{Basis, ChebyshevBasis, FourierBasis};
use hc_rs::equations::NoiseConfig;
use hc_rs::solver::CflConfig;
use hc_rs::{
    Domain, Field, GridScale, RunConfig, Simulation, SolverError, StopConditions, run_workers,
};

fn config() -> RunConfig {
    let mut config = RunConfig::default()
        .with_resolution(16, 16)
        .with_rayleigh(1e4)
        .with_cfl(CflConfig::default().with_initial_dt(0.05).with_max_dt(0.05))
        .with_stop(StopConditions::default().with_iteration(5));
    config.output.snapshot_dt = None;
    config.output.diagnostics_iter = None;
    config
}

/// Gathered unit-scale grids of `names` from rank 0, after running
/// `config` when `step` is set and straight after setup otherwise.
fn gathered(workers: usize, config: &RunConfig, step: bool, names: &[&str]) -> Vec<Vec<f64>> {
    let results = run_workers(workers, |comm| -> hc_rs::Result<Option<Vec<Vec<f64>>>> {
        let mut sim = Simulation::new(config.clone(), comm)?;
        if step {
            sim.run()?;
        }
        let mut grids = Vec::new();
        for &name in names {
            let mut f = sim.solver().field(name)?.clone();
            f.set_scale(GridScale::Unit)?;
            f.to_grid()?;
            match f.gather_grid()? {
                Some(g) => grids.push(g),
                None => return Ok(None),
            }
        }
        Ok(Some(grids))
    })
    .unwrap();
    results
        .into_iter()
        .map(|r| r.unwrap())
        .find_map(|g| g)
        .unwrap()
}

fn assert_close(names: &[&str], serial: &[Vec<f64>], split: &[Vec<f64>], tol: f64) {
    for ((name, a), b) in names.iter().zip(serial).zip(split) {
        assert_eq!(a.len(), b.len());
        let scale = a.iter().fold(1.0f64, |m, v| m.max(v.abs()));
        let diff = a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max);
        assert!(diff / scale < tol, "{} differs by {:e}", name, diff);
    }
}

#[test]
fn test_two_workers_match_serial() {
    let names = ["b", "u", "w", "p"];
    let config = config();
    let serial = gathered(1, &config, true, &names);
    let split = gathered(2, &config, true, &names);
    assert_close(&names, &serial, &split, 1e-9);
}

#[test]
fn test_noisy_initial_state_is_independent_of_workers() {
    let names = ["b", "bz"];
    let config = config().with_noise(NoiseConfig {
        amplitude: 1e-3,
        seed: 42,
    });
    let serial = gathered(1, &config, false, &names);
    let split = gathered(2, &config, false, &names);
    assert_close(&names, &serial, &split, 1e-12);
    // The perturbation is actually there.
    assert!(serial[0].iter().any(|v| (v + 0.6).abs() > 1e-5));
}

#[test]
fn test_distributed_transform_and_integral() {
    let results = run_workers(2, |comm| -> hc_rs::Result<(f64, Option<Vec<f64>>)> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 2.0))?.into(),
            ChebyshevBasis::new("z", 8, (0.0, 1.0))?.into(),
        ];
        let d = Arc::new(Domain::new(bases, comm)?);
        let mut f = Field::new(Arc::clone(&d), "f");
        f.set_grid_fn(|p| 1.0 + (PI * p[0]).sin() * p[1] * p[1])?;
        f.to_coefficient()?;
        let integral = f.integrate()?;
        let mut g = Field::new(Arc::clone(&d), "g");
        g.set_coefficient_values(f.coefficients()?.to_vec())?;
        g.to_grid()?;
        Ok((integral, g.gather_grid()?))
    })
    .unwrap();

    for r in &results {
        let (integral, _) = r.as_ref().unwrap();
        assert!((integral - 2.0).abs() < 1e-12);
    }
    let grid = results[0].as_ref().unwrap().1.as_ref().unwrap();
    assert!(results[1].as_ref().unwrap().1.is_none());

    let x: Vec<f64> = (0..8).map(|i| 2.0 * i as f64 / 8.0).collect();
    let bases = ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap();
    let z = bases.grid(GridScale::Unit);
    for (i, xi) in x.iter().enumerate() {
        for (j, zj) in z.iter().enumerate() {
            let exact = 1.0 + (PI * xi).sin() * zj * zj;
            assert!((grid[i * 8 + j] - exact).abs() < 1e-12);
        }
    }
}

#[test]
fn test_uneven_decomposition_is_rejected() {
    let results = run_workers(3, |comm| Simulation::new(config(), comm).map(|_| ())).unwrap();
    for r in results {
        assert!(matches!(r, Err(SolverError::Configuration(_))));
    }
}
