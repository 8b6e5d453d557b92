//! Spectral operators in coefficient space.
//!
//! This module provides:
//! - Fourier pair rotation and the Chebyshev differentiation matrix
//! - Boundary evaluation rows and integration weights for the Chebyshev axis
//! - Dirichlet basis recombination columns

mod boundary;
mod differentiation;

pub use boundary::{boundary_row, dirichlet_column, integration_weights};
pub use differentiation::{
    chebyshev_derivative_matrix, differentiate_coefficients, fourier_rotation, to_row_major,
};
