//! Boundary evaluation, integration weights and Dirichlet recombination
//! for the Chebyshev axis.

use crate::polynomial::chebyshev_integral;
use crate::types::Side;

/// Row r with Σ_n r_n c_n = u(side): T_n(-1) = (-1)^n, T_n(1) = 1.
pub fn boundary_row(size: usize, side: Side) -> Vec<f64> {
    (0..size)
        .map(|n| match side {
            Side::Right => 1.0,
            Side::Left if n % 2 == 0 => 1.0,
            Side::Left => -1.0,
        })
        .collect()
}

/// Weights w with Σ_n w_n c_n = ∫ u dz over an interval of length `length`.
pub fn integration_weights(size: usize, length: f64) -> Vec<f64> {
    (0..size)
        .map(|n| 0.5 * length * chebyshev_integral(n))
        .collect()
}

/// Column `n` of the Dirichlet recombination P, as (row, value) pairs.
///
/// P maps the recombined basis {T_0, T_1, T_n - T_{n-2} (n >= 2)} to T_n
/// coefficients. Every recombined function with n >= 2 vanishes at both ends,
/// so boundary rows only see the first two columns.
pub fn dirichlet_column(n: usize) -> Vec<(usize, f64)> {
    if n < 2 {
        vec![(n, 1.0)]
    } else {
        vec![(n, 1.0), (n - 2, -1.0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_rows() {
        assert_eq!(boundary_row(4, Side::Left), vec![1.0, -1.0, 1.0, -1.0]);
        assert_eq!(boundary_row(3, Side::Right), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_recombined_columns_vanish_at_walls() {
        for side in [Side::Left, Side::Right] {
            let row = boundary_row(8, side);
            for n in 2..8 {
                let value: f64 = dirichlet_column(n).iter().map(|&(i, v)| row[i] * v).sum();
                assert!(value.abs() < 1e-15);
            }
        }
    }

    #[test]
    fn test_integration_weights() {
        // ∫_0^2 z dz with z = ζ + 1 = T0 + T1 gives 2.
        let w = integration_weights(4, 2.0);
        assert!((w[0] + w[1] - 2.0).abs() < 1e-14);
    }
}
