//! Coefficient-space differentiation.
//!
//! Periodic axes: d/dx rotates each cos/sin pair,
//! (a, b) → (k b, -k a), so the 2x2 operator on (cos, sin) is
//!
//! R(k) = [[0, k], [-k, 0]]
//!
//! Chebyshev axis: the derivative of Σ c_p T_p has coefficients
//! d_n = (2 / (1 + δ_{n0})) Σ_{p > n, p + n odd} p c_p, scaled by 2 / L for an
//! interval of length L. The matrix is strictly upper triangular.

use faer::Mat;

use crate::basis::apply_along_axis;
use crate::domain::Domain;
use crate::polynomial::chebyshev_derivative_coefficients;

/// Chebyshev differentiation matrix D[n, p] for an interval of length `length`.
pub fn chebyshev_derivative_matrix(size: usize, length: f64) -> Mat<f64> {
    let scale = 2.0 / length;
    let mut d = Mat::zeros(size, size);
    for p in 0..size {
        let mut unit = vec![0.0; size];
        unit[p] = 1.0;
        for (n, v) in chebyshev_derivative_coefficients(&unit).into_iter().enumerate() {
            d[(n, p)] = scale * v;
        }
    }
    d
}

/// Row-major copy of a dense matrix.
pub fn to_row_major(m: &Mat<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(m.nrows() * m.ncols());
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            out.push(m[(i, j)]);
        }
    }
    out
}

/// `order`-th power of the cos/sin rotation R(k), indexed `[out][in]`.
pub fn fourier_rotation(k: f64, order: u32) -> [[f64; 2]; 2] {
    let mut r = [[1.0, 0.0], [0.0, 1.0]];
    for _ in 0..order {
        r = [[k * r[1][0], k * r[1][1]], [-k * r[0][0], -k * r[0][1]]];
    }
    r
}

/// Differentiate a coefficient-layout array along `axis` of `domain`.
pub fn differentiate_coefficients(domain: &Domain, coeffs: &[f64], axis: usize) -> Vec<f64> {
    let shape = domain.coeff_shape();
    if axis == domain.z_axis() {
        let basis = domain.basis(axis);
        let d = chebyshev_derivative_matrix(basis.size(), basis.length());
        return apply_along_axis(coeffs, &shape, axis, &to_row_major(&d), basis.size());
    }

    let n = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    let outer: usize = shape[..axis].iter().product();
    let mut out = vec![0.0; coeffs.len()];
    for o in 0..outer {
        for pair in 0..n / 2 {
            let k = domain.wavenumber(axis, domain.global_mode(axis, 2 * pair));
            let cos_at = (o * n + 2 * pair) * inner;
            let sin_at = cos_at + inner;
            for i in 0..inner {
                let a = coeffs[cos_at + i];
                let b = coeffs[sin_at + i];
                out[cos_at + i] = k * b;
                out[sin_at + i] = -k * a;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_powers() {
        let k = 3.0;
        let r1 = fourier_rotation(k, 1);
        assert_eq!(r1, [[0.0, k], [-k, 0.0]]);
        let r2 = fourier_rotation(k, 2);
        assert_eq!(r2, [[-k * k, 0.0], [0.0, -k * k]]);
        assert_eq!(fourier_rotation(k, 0), [[1.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_derivative_matrix_on_polynomial() {
        // u = z² on [0, 2]: ζ = z - 1, u = (ζ + 1)² = ζ² + 2ζ + 1
        // = 1.5 T0 + 2 T1 + 0.5 T2; du/dz = 2z = 2ζ + 2 = 2 T0 + 2 T1.
        let d = chebyshev_derivative_matrix(4, 2.0);
        let c = [1.5, 2.0, 0.5, 0.0];
        let mut out = [0.0; 4];
        for n in 0..4 {
            for p in 0..4 {
                out[n] += d[(n, p)] * c[p];
            }
        }
        assert!((out[0] - 2.0).abs() < 1e-14);
        assert!((out[1] - 2.0).abs() < 1e-14);
        assert!(out[2].abs() < 1e-14 && out[3].abs() < 1e-14);
    }
}
