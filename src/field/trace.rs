use std::sync::Arc;

use crate::domain::Domain;
use crate::error::Result;
use crate::types::{GridScale, Side};

/// A field restricted to one end of the Chebyshev axis.
///
/// Values are periodic coefficients in the local `[2 Mx / P, (Ny)]` block.
#[derive(Clone, Debug)]
pub struct BoundaryTrace {
    domain: Arc<Domain>,
    side: Side,
    coeffs: Vec<f64>,
}

impl BoundaryTrace {
    pub(crate) fn new(domain: Arc<Domain>, side: Side, coeffs: Vec<f64>) -> Self {
        Self {
            domain,
            side,
            coeffs,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    /// Full periodic grid of the trace on every worker (collective).
    pub fn to_grid(&self, scale: GridScale) -> Result<Vec<f64>> {
        self.domain.trace_to_grid(&self.coeffs, scale)
    }
}
