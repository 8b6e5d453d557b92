//! Chebyshev polynomial evaluation.
//!
//! Chebyshev polynomials of the first kind T_n(x) are orthogonal on [-1, 1]
//! with weight 1/sqrt(1 - x²), and satisfy T_n(cos θ) = cos(nθ).

use std::f64::consts::PI;

/// Evaluate Chebyshev polynomial T_n(x) using three-term recurrence.
///
/// The recurrence relation is:
/// T_0(x) = 1
/// T_1(x) = x
/// T_{n+1}(x) = 2x T_n(x) - T_{n-1}(x)
pub fn chebyshev(n: usize, x: f64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    if n == 1 {
        return x;
    }

    let mut t_prev = 1.0; // T_{n-2}
    let mut t_curr = x; // T_{n-1}

    for _ in 1..n {
        let t_next = 2.0 * x * t_curr - t_prev;
        t_prev = t_curr;
        t_curr = t_next;
    }

    t_curr
}

/// Evaluate T_0(x), ..., T_{n-1}(x) in one recurrence sweep.
pub fn chebyshev_all(n: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(n);
    if n == 0 {
        return values;
    }
    values.push(1.0);
    if n == 1 {
        return values;
    }
    values.push(x);
    for k in 2..n {
        let next = 2.0 * x * values[k - 1] - values[k - 2];
        values.push(next);
    }
    values
}

/// Gauss-Chebyshev nodes on [-1, 1] in ascending order.
///
/// x_j = -cos(π (j + 1/2) / G) for j = 0, ..., G-1. These are the roots of
/// T_G, so none of them coincides with an endpoint.
pub fn gauss_chebyshev_nodes(n_points: usize) -> Vec<f64> {
    (0..n_points)
        .map(|j| -(PI * (j as f64 + 0.5) / n_points as f64).cos())
        .collect()
}

/// Coefficients of du/dx given the Chebyshev coefficients of u.
///
/// Uses the backward recurrence
/// d_{n-1} = d_{n+1} + 2 n c_n, with d_0 halved at the end.
pub fn chebyshev_derivative_coefficients(coeffs: &[f64]) -> Vec<f64> {
    let n = coeffs.len();
    let mut d = vec![0.0; n];
    if n < 2 {
        return d;
    }
    // d_{N-1} = 0, d_{N-2} = 2 (N-1) c_{N-1}
    for k in (1..n).rev() {
        let upper = if k + 1 < n { d[k + 1] } else { 0.0 };
        d[k - 1] = upper + 2.0 * k as f64 * coeffs[k];
    }
    d[0] *= 0.5;
    d
}

/// Integral of T_n over [-1, 1].
///
/// ∫ T_n dx = 2 / (1 - n²) for even n, and 0 for odd n.
pub fn chebyshev_integral(n: usize) -> f64 {
    if n % 2 == 1 {
        0.0
    } else {
        let nf = n as f64;
        2.0 / (1.0 - nf * nf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chebyshev_trig_identity() {
        for n in 0..12 {
            for &theta in &[0.1, 0.7, 1.3, 2.9] {
                let x: f64 = f64::cos(theta);
                let expected = (n as f64 * theta).cos();
                assert!(
                    (chebyshev(n, x) - expected).abs() < 1e-12,
                    "T_{}(cos {}) should be cos({} * {})",
                    n,
                    theta,
                    n,
                    theta
                );
            }
        }
    }

    #[test]
    fn test_chebyshev_all_matches_single() {
        let values = chebyshev_all(9, 0.37);
        for (n, &v) in values.iter().enumerate() {
            assert!((v - chebyshev(n, 0.37)).abs() < 1e-14);
        }
    }

    #[test]
    fn test_nodes_ascending_interior() {
        let nodes = gauss_chebyshev_nodes(16);
        assert_eq!(nodes.len(), 16);
        for w in nodes.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(nodes[0] > -1.0 && nodes[15] < 1.0);
        // Roots of T_16
        for &x in &nodes {
            assert!(chebyshev(16, x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_derivative_of_t3() {
        // T_3 = 4x³ - 3x, T_3' = 12x² - 3 = 6 T_2 + 3 T_0
        let d = chebyshev_derivative_coefficients(&[0.0, 0.0, 0.0, 1.0]);
        assert!((d[0] - 3.0).abs() < 1e-14);
        assert!(d[1].abs() < 1e-14);
        assert!((d[2] - 6.0).abs() < 1e-14);
        assert!(d[3].abs() < 1e-14);
    }

    #[test]
    fn test_integral_values() {
        assert!((chebyshev_integral(0) - 2.0).abs() < 1e-14);
        assert_eq!(chebyshev_integral(1), 0.0);
        assert!((chebyshev_integral(2) + 2.0 / 3.0).abs() < 1e-14);
    }
}
