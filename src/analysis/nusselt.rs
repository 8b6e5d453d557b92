//! Nusselt number from the buoyancy variance dissipation.
//!
//! The purely diffusive state under the surface forcing `cos(κ x)`,
//! κ = 2π / Lx, with an insulating bottom is
//!
//! ```text
//! b = cos(κ x) cosh(κ z) / cosh(κ Lz)
//! ```
//!
//! whose volume-averaged dissipation is `χ_diff = P κ tanh(κ Lz) / (2 Lz)`.
//! The Nusselt number is the ratio of the measured dissipation to it.

use std::f64::consts::PI;
use std::path::Path;

use crate::io::{Container, SnapshotError};

/// Dissipation of the diffusive solution for diffusivity `p`.
pub fn diffusive_dissipation(p: f64, lx: f64, lz: f64) -> f64 {
    let kappa = 2.0 * PI / lx;
    p * kappa * (kappa * lz).tanh() / (2.0 * lz)
}

/// Nu = χ / χ_diff.
pub fn nusselt(chi: f64, p: f64, lx: f64, lz: f64) -> f64 {
    chi / diffusive_dissipation(p, lx, lz)
}

/// Time series of a scalar task across containers, in write order.
pub fn scalar_series(
    paths: &[impl AsRef<Path>],
    task: &str,
) -> Result<Vec<(f64, f64)>, SnapshotError> {
    let mut series = Vec::new();
    for path in paths {
        let container = Container::read(path)?;
        for record in &container.records {
            let value = record
                .task(task)
                .and_then(|t| t.as_scalar())
                .ok_or_else(|| SnapshotError::Format(format!("no scalar task '{}'", task)))?;
            series.push((record.sim_time, value));
        }
    }
    Ok(series)
}

/// Time-weighted mean of a series over `[start, end]` (trapezoidal).
/// A single sample in the window is returned as is.
pub fn time_mean(series: &[(f64, f64)], start: f64) -> Option<f64> {
    let window: Vec<_> = series.iter().filter(|(t, _)| *t >= start).collect();
    match window.as_slice() {
        [] => None,
        [(_, v)] => Some(*v),
        [first, .., last] => {
            let span = last.0 - first.0;
            if span <= 0.0 {
                return Some(window.iter().map(|(_, v)| v).sum::<f64>() / window.len() as f64);
            }
            let area: f64 = window
                .windows(2)
                .map(|w| 0.5 * (w[0].1 + w[1].1) * (w[1].0 - w[0].0))
                .sum();
            Some(area / span)
        }
    }
}

/// Mean Nusselt number of a diagnostics run from `start` on.
pub fn mean_nusselt(
    paths: &[impl AsRef<Path>],
    start: f64,
    p: f64,
    lx: f64,
    lz: f64,
) -> Result<f64, SnapshotError> {
    let series = scalar_series(paths, "chi")?;
    let chi = time_mean(&series, start)
        .ok_or_else(|| SnapshotError::Format(format!("no chi samples after t = {}", start)))?;
    Ok(nusselt(chi, p, lx, lz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_limit() {
        // tanh → 1 for a deep box
        let chi = diffusive_dissipation(1.0, 1.0, 50.0);
        assert!((chi - 2.0 * PI / 100.0).abs() < 1e-12);
        assert!((nusselt(chi, 1.0, 1.0, 50.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_mean() {
        let s = [(0.0, 100.0), (1.0, 1.0), (2.0, 3.0), (4.0, 3.0)];
        assert!((time_mean(&s, 1.0).unwrap() - (2.0 + 6.0) / 3.0).abs() < 1e-12);
        assert_eq!(time_mean(&s, 4.0), Some(3.0));
        assert_eq!(time_mean(&s, 5.0), None);
    }
}
