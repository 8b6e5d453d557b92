//! Dense one-dimensional transform plans.
//!
//! A plan stores the grid→coefficient (`forward`) and coefficient→grid
//! (`backward`) matrices for one basis at one grid scale, both row-major.
//! Multi-dimensional transforms apply them axis by axis with
//! [`apply_along_axis`].

use faer::linalg::matmul::matmul;
use faer::{Accum, MatMut, MatRef, Par};

/// Forward and backward matrices of one basis at one scale.
#[derive(Clone, Debug)]
pub struct TransformPlan {
    /// Number of spectral coefficients.
    pub n_coeff: usize,
    /// Number of grid points.
    pub n_grid: usize,
    /// Forward matrix, `n_coeff x n_grid`.
    pub forward: Vec<f64>,
    /// Backward matrix, `n_grid x n_coeff`.
    pub backward: Vec<f64>,
}

impl TransformPlan {
    /// Build a plan from element generators.
    pub fn from_fn<F, B>(n_coeff: usize, n_grid: usize, forward: F, backward: B) -> Self
    where
        F: Fn(usize, usize) -> f64,
        B: Fn(usize, usize) -> f64,
    {
        let mut fwd = Vec::with_capacity(n_coeff * n_grid);
        for i in 0..n_coeff {
            for j in 0..n_grid {
                fwd.push(forward(i, j));
            }
        }
        let mut bwd = Vec::with_capacity(n_grid * n_coeff);
        for j in 0..n_grid {
            for i in 0..n_coeff {
                bwd.push(backward(j, i));
            }
        }
        Self {
            n_coeff,
            n_grid,
            forward: fwd,
            backward: bwd,
        }
    }

    /// Grid values → coefficients along `axis` of a row-major array.
    pub fn forward_along(&self, data: &[f64], dims: &[usize], axis: usize) -> Vec<f64> {
        debug_assert_eq!(dims[axis], self.n_grid);
        apply_along_axis(data, dims, axis, &self.forward, self.n_coeff)
    }

    /// Coefficients → grid values along `axis` of a row-major array.
    pub fn backward_along(&self, data: &[f64], dims: &[usize], axis: usize) -> Vec<f64> {
        debug_assert_eq!(dims[axis], self.n_coeff);
        apply_along_axis(data, dims, axis, &self.backward, self.n_grid)
    }
}

/// Apply a dense `rows x dims[axis]` matrix along one axis of a row-major array.
///
/// The output has the same shape as the input except `dims[axis]` becomes `rows`.
pub fn apply_along_axis(
    data: &[f64],
    dims: &[usize],
    axis: usize,
    matrix: &[f64],
    rows: usize,
) -> Vec<f64> {
    let cols = dims[axis];
    let outer: usize = dims[..axis].iter().product();
    let inner: usize = dims[axis + 1..].iter().product();
    debug_assert_eq!(data.len(), outer * cols * inner);
    debug_assert_eq!(matrix.len(), rows * cols);

    let mut out = vec![0.0; outer * rows * inner];
    if out.is_empty() || cols == 0 {
        return out;
    }
    let lhs = MatRef::from_row_major_slice(matrix, rows, cols);
    // Each outer block is a row-major `cols x inner` matrix.
    for (src, dst) in data
        .chunks_exact(cols * inner)
        .zip(out.chunks_exact_mut(rows * inner))
    {
        matmul(
            MatMut::from_row_major_slice_mut(dst, rows, inner),
            Accum::Replace,
            lhs,
            MatRef::from_row_major_slice(src, cols, inner),
            1.0,
            Par::Seq,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_identity_middle_axis() {
        let dims = [2, 3, 2];
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let out = apply_along_axis(&data, &dims, 1, &identity, 3);
        assert_eq!(out, data);
    }

    #[test]
    fn test_apply_sum_last_axis() {
        let dims = [2, 3];
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let sum = [1.0, 1.0, 1.0];
        let out = apply_along_axis(&data, &dims, 1, &sum, 1);
        assert_eq!(out, vec![6.0, 15.0]);
    }

    #[test]
    fn test_apply_rectangular_first_axis() {
        // [[1, 2], [0, 1], [1, 0]] applied to the rows of a 2 x 2 array.
        let dims = [2, 2];
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let matrix = [1.0, 2.0, 0.0, 1.0, 1.0, 0.0];
        let out = apply_along_axis(&data, &dims, 0, &matrix, 3);
        assert_eq!(out, vec![7.0, 10.0, 3.0, 4.0, 1.0, 2.0]);
    }
}
