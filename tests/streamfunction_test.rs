//! Streamfunction recovery from a known divergence-free flow.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use hc_rs::analysis::{recover_streamfunction, solve_streamfunction, velocity_mismatch};
use hc_rs::basis::{Basis, ChebyshevBasis, FourierBasis};
use hc_rs::equations::{field, integrate_axis};
use hc_rs::io::{Cadence, Container, Evaluator, list_containers};
use hc_rs::{Domain, Field, GridScale, SerialCommunicator};

const LX: f64 = 4.0;

fn domain() -> Arc<Domain> {
    let bases: Vec<Basis> = vec![
        FourierBasis::new("x", 16, (0.0, LX)).unwrap().into(),
        ChebyshevBasis::new("z", 24, (0.0, 1.0)).unwrap().into(),
    ];
    Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
}

fn psi_exact(p: &[f64]) -> f64 {
    let k = 2.0 * PI / LX;
    (PI * p[1]).sin() * (k * p[0]).cos() + 0.3 * (2.0 * PI * p[1]).sin()
}

/// u = -∂zψ, w = ∂xψ of [`psi_exact`].
fn velocities(d: &Arc<Domain>) -> (Field, Field) {
    let k = 2.0 * PI / LX;
    let mut u = Field::new(Arc::clone(d), "u");
    u.set_grid_fn(|p| {
        -(PI * (PI * p[1]).cos() * (k * p[0]).cos() + 0.6 * PI * (2.0 * PI * p[1]).cos())
    })
    .unwrap();
    u.to_coefficient().unwrap();
    let mut w = Field::new(Arc::clone(d), "w");
    w.set_grid_fn(|p| -k * (PI * p[1]).sin() * (k * p[0]).sin()).unwrap();
    w.to_coefficient().unwrap();
    (u, w)
}

#[test]
fn test_recovers_known_streamfunction() {
    let d = domain();
    let (u, w) = velocities(&d);
    let mut psi = solve_streamfunction(&u, &w).unwrap();
    psi.to_grid().unwrap();

    let mut exact = Field::new(Arc::clone(&d), "exact");
    exact.set_grid_fn(psi_exact).unwrap();
    let err = psi
        .grid()
        .unwrap()
        .iter()
        .zip(exact.grid().unwrap())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(err < 1e-9, "max error {:e}", err);

    let mismatch = velocity_mismatch(&psi, &u, &w).unwrap().unwrap();
    assert!(mismatch < 1e-8, "velocity mismatch {:e}", mismatch);
}

#[test]
fn test_recovery_from_snapshots() {
    let d = domain();
    let (u, w) = velocities(&d);
    let snapshots = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();

    let mut ev = Evaluator::new(Arc::clone(&d), snapshots.path());
    ev.add_file_handler("snapshots", Cadence::Iteration(1), 10)
        .add_task("u", field("u"))
        .add_task("w", field("w"));
    let fields = [u, w];
    for it in 0..3 {
        ev.evaluate_scheduled(&fields, &BTreeMap::new(), it, it as f64, 0.0, false)
            .unwrap();
    }
    ev.flush().unwrap();

    let containers = list_containers(snapshots.path(), "snapshots").unwrap();
    recover_streamfunction(&d, &containers, out.path()).unwrap();

    let written = list_containers(out.path(), "streamfunction").unwrap();
    assert_eq!(written.len(), 1);
    let c = Container::read(&written[0]).unwrap();
    assert_eq!(c.records.len(), 1);
    assert!((c.records[0].sim_time - 1.0).abs() < 1e-12);
    let psi = c.records[0].task("psi").unwrap();

    let x = c.axis("x").unwrap();
    let z = c.axis("z").unwrap();
    assert_eq!(x.len() * z.len(), psi.data.len());
    assert_eq!(z, ChebyshevBasis::new("z", 24, (0.0, 1.0)).unwrap().grid(GridScale::Unit));
    // ψ_exact has zero mean, so mean removal leaves it unchanged.
    for (i, xi) in x.iter().enumerate() {
        for (j, zj) in z.iter().enumerate() {
            let v = psi.data[i * z.len() + j];
            assert!((v - psi_exact(&[*xi, *zj])).abs() < 1e-8);
        }
    }
}

/// The velocities of [`velocities`] plus y-dependent parts with zero y-mean.
fn velocities_3d(d: &Arc<Domain>) -> (Field, Field) {
    let k = 2.0 * PI / LX;
    let mut u = Field::new(Arc::clone(d), "u");
    u.set_grid_fn(|p| {
        -(PI * (PI * p[2]).cos() * (k * p[0]).cos() + 0.6 * PI * (2.0 * PI * p[2]).cos())
            + 0.5 * (2.0 * PI * p[1]).cos() * p[2]
    })
    .unwrap();
    u.to_coefficient().unwrap();
    let mut w = Field::new(Arc::clone(d), "w");
    w.set_grid_fn(|p| -k * (PI * p[2]).sin() * (k * p[0]).sin() + 0.2 * (2.0 * PI * p[1]).sin())
        .unwrap();
    w.to_coefficient().unwrap();
    (u, w)
}

#[test]
fn test_recovery_from_3d_records() {
    let bases: Vec<Basis> = vec![
        FourierBasis::new("x", 16, (0.0, LX)).unwrap().into(),
        FourierBasis::new("y", 4, (0.0, 1.0)).unwrap().into(),
        ChebyshevBasis::new("z", 24, (0.0, 1.0)).unwrap().into(),
    ];
    let d3 = Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap());
    let (u, w) = velocities_3d(&d3);
    let snapshots = tempfile::tempdir().unwrap();

    let mut ev = Evaluator::new(Arc::clone(&d3), snapshots.path());
    ev.add_file_handler("snapshots", Cadence::Iteration(1), 10)
        .add_task("u", field("u"))
        .add_task("w", field("w"));
    ev.add_file_handler("2d_averages", Cadence::Iteration(1), 10)
        .add_task("u", integrate_axis("y", field("u")))
        .add_task("w", integrate_axis("y", field("w")));
    let fields = [u, w];
    for it in 0..2 {
        ev.evaluate_scheduled(&fields, &BTreeMap::new(), it, it as f64, 0.0, false)
            .unwrap();
    }
    ev.flush().unwrap();

    let d2 = domain();
    let mut exact = Field::new(Arc::clone(&d2), "exact");
    exact.set_grid_fn(psi_exact).unwrap();
    let exact = exact.grid().unwrap().to_vec();
    for handler in ["snapshots", "2d_averages"] {
        let containers = list_containers(snapshots.path(), handler).unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut psi = recover_streamfunction(&d2, &containers, out.path()).unwrap();
        psi.to_grid().unwrap();
        let err = psi
            .grid()
            .unwrap()
            .iter()
            .zip(&exact)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-8, "{}: max error {:e}", handler, err);
    }
}
