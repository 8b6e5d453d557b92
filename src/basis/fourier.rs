//! Real Fourier basis on a periodic interval.
//!
//! A basis of size N keeps the modes m = 0, ..., N/2 - 1 (the Nyquist mode is
//! dropped). Coefficients are stored as real cos/sin pairs, so coefficient
//! `q = 2m + bit` holds `a_m` (bit 0) or `b_m` (bit 1):
//!
//! f(x) = Σ_m a_m cos(k_m x) + b_m sin(k_m x),   k_m = 2πm / L
//!
//! `b_0` is carried for layout regularity and is always zero.

use std::f64::consts::PI;

use crate::error::{Result, SolverError};
use crate::types::GridScale;

use super::transform::TransformPlan;

/// Default ratio of grid points to modes for nonlinear products.
pub const DEFAULT_DEALIAS: f64 = 1.5;

/// Periodic basis with cos/sin coefficient pairs.
#[derive(Clone, Debug)]
pub struct FourierBasis {
    name: String,
    size: usize,
    interval: (f64, f64),
    dealias: f64,
    unit_plan: TransformPlan,
    dealias_plan: TransformPlan,
}

impl FourierBasis {
    /// Create a Fourier basis with `size` coefficients on `interval`.
    ///
    /// `size` must be even and positive.
    pub fn new(name: impl Into<String>, size: usize, interval: (f64, f64)) -> Result<Self> {
        Self::with_dealias(name, size, interval, DEFAULT_DEALIAS)
    }

    /// Create a Fourier basis with an explicit dealiasing factor.
    pub fn with_dealias(
        name: impl Into<String>,
        size: usize,
        interval: (f64, f64),
        dealias: f64,
    ) -> Result<Self> {
        let name = name.into();
        if size == 0 || size % 2 != 0 {
            return Err(SolverError::configuration(format!(
                "Fourier basis '{}' needs an even, positive size (got {})",
                name, size
            )));
        }
        super::check_interval(&name, interval)?;
        super::check_dealias(&name, dealias)?;

        let unit_plan = build_plan(size, interval, grid_size(size, 1.0));
        let dealias_plan = build_plan(size, interval, grid_size(size, dealias));
        Ok(Self {
            name,
            size,
            interval,
            dealias,
            unit_plan,
            dealias_plan,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of real coefficients (2 per retained mode).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of retained modes, N/2.
    pub fn n_modes(&self) -> usize {
        self.size / 2
    }

    pub fn interval(&self) -> (f64, f64) {
        self.interval
    }

    pub fn length(&self) -> f64 {
        self.interval.1 - self.interval.0
    }

    pub fn dealias(&self) -> f64 {
        self.dealias
    }

    /// Wavenumber of mode `m`.
    pub fn wavenumber(&self, mode: usize) -> f64 {
        2.0 * PI * mode as f64 / self.length()
    }

    pub fn grid_size(&self, scale: GridScale) -> usize {
        grid_size(self.size, scale.factor(self.dealias))
    }

    /// Equispaced grid starting at the left end of the interval.
    pub fn grid(&self, scale: GridScale) -> Vec<f64> {
        let g = self.grid_size(scale);
        let h = self.length() / g as f64;
        (0..g).map(|j| self.interval.0 + h * j as f64).collect()
    }

    /// Uniform spacing L / G at every point.
    pub fn grid_spacing(&self, scale: GridScale) -> Vec<f64> {
        let g = self.grid_size(scale);
        vec![self.length() / g as f64; g]
    }

    pub fn plan(&self, scale: GridScale) -> &TransformPlan {
        match scale {
            GridScale::Unit => &self.unit_plan,
            GridScale::Dealias => &self.dealias_plan,
        }
    }
}

pub(super) fn grid_size(size: usize, factor: f64) -> usize {
    (size as f64 * factor).ceil() as usize
}

fn build_plan(size: usize, interval: (f64, f64), n_grid: usize) -> TransformPlan {
    let length = interval.1 - interval.0;
    let h = length / n_grid as f64;
    let x = |j: usize| interval.0 + h * j as f64;
    let k = |q: usize| 2.0 * PI * (q / 2) as f64 / length;
    let g = n_grid as f64;

    TransformPlan::from_fn(
        size,
        n_grid,
        |q, j| {
            let m = q / 2;
            match (m, q % 2) {
                (0, 0) => 1.0 / g,
                (0, _) => 0.0,
                (_, 0) => 2.0 / g * (k(q) * x(j)).cos(),
                _ => 2.0 / g * (k(q) * x(j)).sin(),
            }
        },
        |j, q| {
            if q % 2 == 0 {
                (k(q) * x(j)).cos()
            } else {
                (k(q) * x(j)).sin()
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_odd_size() {
        assert!(FourierBasis::new("x", 7, (0.0, 1.0)).is_err());
        assert!(FourierBasis::new("x", 0, (0.0, 1.0)).is_err());
    }

    #[test]
    fn test_grid_sizes() {
        let basis = FourierBasis::new("x", 64, (0.0, 4.0)).unwrap();
        assert_eq!(basis.grid_size(GridScale::Unit), 64);
        assert_eq!(basis.grid_size(GridScale::Dealias), 96);
        assert_eq!(basis.n_modes(), 32);
        assert!((basis.wavenumber(1) - PI / 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_forward_picks_single_mode() {
        let basis = FourierBasis::new("x", 16, (-1.0, 3.0)).unwrap();
        for scale in [GridScale::Unit, GridScale::Dealias] {
            let k3 = basis.wavenumber(3);
            let data: Vec<f64> = basis
                .grid(scale)
                .iter()
                .map(|&x| 0.5 + 2.0 * (k3 * x).sin() - (basis.wavenumber(1) * x).cos())
                .collect();
            let g = data.len();
            let coeffs = basis.plan(scale).forward_along(&data, &[g], 0);
            for (q, &c) in coeffs.iter().enumerate() {
                let expected = match q {
                    0 => 0.5,
                    2 => -1.0,
                    7 => 2.0,
                    _ => 0.0,
                };
                assert!(
                    (c - expected).abs() < 1e-12,
                    "coefficient {} is {} (expected {})",
                    q,
                    c,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_roundtrip_dealias_grid() {
        let basis = FourierBasis::new("x", 12, (0.0, 2.0)).unwrap();
        let coeffs: Vec<f64> = (0..12)
            .map(|q| if q == 1 { 0.0 } else { 1.0 / (q + 1) as f64 })
            .collect();
        let plan = basis.plan(GridScale::Dealias);
        let grid = plan.backward_along(&coeffs, &[12], 0);
        let back = plan.forward_along(&grid, &[grid.len()], 0);
        for (a, b) in coeffs.iter().zip(&back) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
