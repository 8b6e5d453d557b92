//! Chebyshev basis on a bounded interval.
//!
//! Coefficients multiply T_n(ζ) with ζ ∈ [-1, 1] mapped affinely onto
//! (z0, z1). The grid lives on the Gauss-Chebyshev points in ascending order,
//! so `left` is z0 and `right` is z1.
//!
//! The backward matrix is the Vandermonde matrix V[j, n] = T_n(ζ_j). The
//! forward matrix uses discrete orthogonality of T_n on the Gauss points:
//!
//! c_n = (2 / G) Σ_j f_j T_n(ζ_j),   c_0 halved

use faer::Mat;

use crate::error::{Result, SolverError};
use crate::polynomial::{chebyshev_all, gauss_chebyshev_nodes};
use crate::types::GridScale;

use super::fourier::{DEFAULT_DEALIAS, grid_size};
use super::transform::TransformPlan;

/// Non-periodic basis of Chebyshev polynomials of the first kind.
#[derive(Clone, Debug)]
pub struct ChebyshevBasis {
    name: String,
    size: usize,
    interval: (f64, f64),
    dealias: f64,
    unit_plan: TransformPlan,
    dealias_plan: TransformPlan,
}

impl ChebyshevBasis {
    /// Create a Chebyshev basis with `size` coefficients on `interval`.
    pub fn new(name: impl Into<String>, size: usize, interval: (f64, f64)) -> Result<Self> {
        Self::with_dealias(name, size, interval, DEFAULT_DEALIAS)
    }

    /// Create a Chebyshev basis with an explicit dealiasing factor.
    pub fn with_dealias(
        name: impl Into<String>,
        size: usize,
        interval: (f64, f64),
        dealias: f64,
    ) -> Result<Self> {
        let name = name.into();
        if size < 2 {
            return Err(SolverError::configuration(format!(
                "Chebyshev basis '{}' needs at least 2 coefficients (got {})",
                name, size
            )));
        }
        super::check_interval(&name, interval)?;
        super::check_dealias(&name, dealias)?;

        let unit_plan = build_plan(size, grid_size(size, 1.0));
        let dealias_plan = build_plan(size, grid_size(size, dealias));
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

    pub fn size(&self) -> usize {
        self.size
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

    pub fn grid_size(&self, scale: GridScale) -> usize {
        grid_size(self.size, scale.factor(self.dealias))
    }

    /// Gauss-Chebyshev points on [-1, 1].
    pub fn native_grid(&self, scale: GridScale) -> Vec<f64> {
        gauss_chebyshev_nodes(self.grid_size(scale))
    }

    /// Physical grid points in ascending order.
    pub fn grid(&self, scale: GridScale) -> Vec<f64> {
        let center = 0.5 * (self.interval.0 + self.interval.1);
        let half = 0.5 * self.length();
        self.native_grid(scale)
            .into_iter()
            .map(|zeta| center + half * zeta)
            .collect()
    }

    /// Local spacing by centered differences, one-sided at the ends.
    pub fn grid_spacing(&self, scale: GridScale) -> Vec<f64> {
        let z = self.grid(scale);
        let g = z.len();
        if g < 2 {
            return vec![self.length(); g];
        }
        (0..g)
            .map(|j| {
                if j == 0 {
                    z[1] - z[0]
                } else if j == g - 1 {
                    z[g - 1] - z[g - 2]
                } else {
                    0.5 * (z[j + 1] - z[j - 1])
                }
            })
            .collect()
    }

    pub fn plan(&self, scale: GridScale) -> &TransformPlan {
        match scale {
            GridScale::Unit => &self.unit_plan,
            GridScale::Dealias => &self.dealias_plan,
        }
    }

    /// Vandermonde matrix V[j, n] = T_n(ζ_j) at the given scale.
    pub fn vandermonde(&self, scale: GridScale) -> Mat<f64> {
        let nodes = self.native_grid(scale);
        let mut v = Mat::zeros(nodes.len(), self.size);
        for (j, &zeta) in nodes.iter().enumerate() {
            for (n, t) in chebyshev_all(self.size, zeta).into_iter().enumerate() {
                v[(j, n)] = t;
            }
        }
        v
    }
}

fn build_plan(size: usize, n_grid: usize) -> TransformPlan {
    let nodes = gauss_chebyshev_nodes(n_grid);
    let table: Vec<Vec<f64>> = nodes.iter().map(|&z| chebyshev_all(size, z)).collect();
    let g = n_grid as f64;
    TransformPlan::from_fn(
        size,
        n_grid,
        |n, j| {
            let w = if n == 0 { 1.0 / g } else { 2.0 / g };
            w * table[j][n]
        },
        |j, n| table[j][n],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::linalg::solvers::Solve;

    #[test]
    fn test_grid_ascending_inside_interval() {
        let basis = ChebyshevBasis::new("z", 16, (0.0, 1.0)).unwrap();
        let z = basis.grid(GridScale::Dealias);
        assert_eq!(z.len(), 24);
        assert!(z[0] > 0.0 && z[23] < 1.0);
        for w in z.windows(2) {
            assert!(w[0] < w[1]);
        }
        let dz = basis.grid_spacing(GridScale::Dealias);
        assert!(dz.iter().all(|&h| h > 0.0));
        // Clustered near the walls
        assert!(dz[0] < dz[12]);
    }

    #[test]
    fn test_forward_inverts_vandermonde() {
        // On the unit grid the forward matrix must equal V^{-1}.
        let basis = ChebyshevBasis::new("z", 10, (-2.0, 3.0)).unwrap();
        let v = basis.vandermonde(GridScale::Unit);
        let lu = v.as_ref().full_piv_lu();
        let plan = basis.plan(GridScale::Unit);
        for j in 0..10 {
            let mut rhs = Mat::zeros(10, 1);
            rhs[(j, 0)] = 1.0;
            let col = lu.solve(&rhs);
            for n in 0..10 {
                assert!(
                    (col[(n, 0)] - plan.forward[n * 10 + j]).abs() < 1e-12,
                    "forward[{}, {}] differs from V^-1",
                    n,
                    j
                );
            }
        }
    }

    #[test]
    fn test_polynomial_roundtrip() {
        let basis = ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap();
        for scale in [GridScale::Unit, GridScale::Dealias] {
            let values: Vec<f64> = basis
                .grid(scale)
                .iter()
                .map(|&z| 1.0 + z - 3.0 * z.powi(4))
                .collect();
            let plan = basis.plan(scale);
            let coeffs = plan.forward_along(&values, &[values.len()], 0);
            let back = plan.backward_along(&coeffs, &[8], 0);
            for (a, b) in values.iter().zip(&back) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }
}
