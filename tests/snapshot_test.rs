//! Reading run output back: rollover, truncated files, Nusselt numbers.

use std::sync::Arc;

use hc_rs::analysis::{mean_nusselt, time_average};
use hc_rs::io::{Container, list_containers};
use hc_rs::solver::CflConfig;
use hc_rs::{RunConfig, SerialCommunicator, Simulation, StopConditions};

fn short_run(dir: &std::path::Path) {
    let mut config = RunConfig::default()
        .with_resolution(16, 8)
        .with_rayleigh(1e4)
        .with_cfl(CflConfig::default().with_initial_dt(0.05).with_max_dt(0.05))
        .with_stop(StopConditions::default().with_iteration(10))
        .with_output_dir(dir);
    config.output.snapshot_dt = Some(0.12);
    config.output.snapshot_max_writes = 2;
    config.output.diagnostics_iter = Some(1);
    Simulation::new(config, Arc::new(SerialCommunicator::new()))
        .unwrap()
        .run()
        .unwrap();
}

#[test]
fn test_snapshot_sets_roll_over() {
    let dir = tempfile::tempdir().unwrap();
    short_run(dir.path());

    let sets = list_containers(dir.path(), "snapshots").unwrap();
    // Writes at t = 0, 0.15, 0.25, 0.4 and 0.5, in sets of two.
    assert_eq!(sets.len(), 3);
    let mut numbers = Vec::new();
    for (k, path) in sets.iter().enumerate() {
        let c = Container::read(path).unwrap();
        assert_eq!(c.header.set_number as usize, k + 1);
        assert_eq!(c.header.tasks, ["b", "bz", "u", "w"]);
        assert!(!c.truncated);
        numbers.extend(c.records.iter().map(|r| r.write_number));
    }
    assert_eq!(numbers, [1, 2, 3, 4, 5]);
}

#[test]
fn test_truncated_final_record_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    short_run(dir.path());

    let sets = list_containers(dir.path(), "snapshots").unwrap();
    let last = sets.last().unwrap();
    let bytes = std::fs::read(last).unwrap();
    std::fs::write(last, &bytes[..bytes.len() - 100]).unwrap();

    let c = Container::read(last).unwrap();
    assert!(c.truncated);
    assert!(c.records.is_empty());

    // Averages still use every complete record.
    let (means, t) = time_average(&sets, &["u", "w"]).unwrap();
    assert_eq!(means["u"].len(), 16 * 8);
    assert!(t > 0.0);
}

#[test]
fn test_nusselt_from_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    short_run(dir.path());

    let diagnostics = list_containers(dir.path(), "diagnostics").unwrap();
    let c = Container::read(&diagnostics[0]).unwrap();
    assert_eq!(c.records.len(), 11);

    let p = RunConfig::default().with_rayleigh(1e4).physics.model().diffusivity();
    let nu = mean_nusselt(&diagnostics, 0.0, p, 4.0, 1.0).unwrap();
    assert!(nu.is_finite() && nu > 0.0);
    assert!(mean_nusselt(&diagnostics, 100.0, p, 4.0, 1.0).is_err());
}
