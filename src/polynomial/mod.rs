//! Polynomial evaluation and node generation.
//!
//! This module provides:
//! - Chebyshev polynomials of the first kind
//! - Gauss-Chebyshev nodes (the non-periodic grid)
//! - The coefficient-space derivative recurrence and exact integrals

mod chebyshev;

pub use chebyshev::{
    chebyshev, chebyshev_all, chebyshev_derivative_coefficients, chebyshev_integral,
    gauss_chebyshev_nodes,
};
