//! Spectral bases for one spatial dimension.
//!
//! - [`FourierBasis`]: periodic axis, real cos/sin coefficient pairs
//! - [`ChebyshevBasis`]: bounded axis, Chebyshev polynomials on Gauss points
//!
//! Each basis owns its dealiasing factor and a dense [`TransformPlan`] for the
//! unit and dealiased grids.

mod chebyshev;
mod fourier;
mod transform;

pub use chebyshev::ChebyshevBasis;
pub use fourier::{DEFAULT_DEALIAS, FourierBasis};
pub use transform::{TransformPlan, apply_along_axis};

use crate::error::{Result, SolverError};
use crate::types::GridScale;

/// One axis of a tensor-product domain.
#[derive(Clone, Debug)]
pub enum Basis {
    Fourier(FourierBasis),
    Chebyshev(ChebyshevBasis),
}

impl Basis {
    pub fn name(&self) -> &str {
        match self {
            Basis::Fourier(b) => b.name(),
            Basis::Chebyshev(b) => b.name(),
        }
    }

    /// Number of real coefficients along this axis.
    pub fn size(&self) -> usize {
        match self {
            Basis::Fourier(b) => b.size(),
            Basis::Chebyshev(b) => b.size(),
        }
    }

    pub fn interval(&self) -> (f64, f64) {
        match self {
            Basis::Fourier(b) => b.interval(),
            Basis::Chebyshev(b) => b.interval(),
        }
    }

    pub fn length(&self) -> f64 {
        let (a, b) = self.interval();
        b - a
    }

    pub fn dealias(&self) -> f64 {
        match self {
            Basis::Fourier(b) => b.dealias(),
            Basis::Chebyshev(b) => b.dealias(),
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Basis::Fourier(_))
    }

    pub fn grid_size(&self, scale: GridScale) -> usize {
        match self {
            Basis::Fourier(b) => b.grid_size(scale),
            Basis::Chebyshev(b) => b.grid_size(scale),
        }
    }

    pub fn grid(&self, scale: GridScale) -> Vec<f64> {
        match self {
            Basis::Fourier(b) => b.grid(scale),
            Basis::Chebyshev(b) => b.grid(scale),
        }
    }

    pub fn grid_spacing(&self, scale: GridScale) -> Vec<f64> {
        match self {
            Basis::Fourier(b) => b.grid_spacing(scale),
            Basis::Chebyshev(b) => b.grid_spacing(scale),
        }
    }

    pub fn plan(&self, scale: GridScale) -> &TransformPlan {
        match self {
            Basis::Fourier(b) => b.plan(scale),
            Basis::Chebyshev(b) => b.plan(scale),
        }
    }

    pub fn as_fourier(&self) -> Option<&FourierBasis> {
        match self {
            Basis::Fourier(b) => Some(b),
            Basis::Chebyshev(_) => None,
        }
    }

    pub fn as_chebyshev(&self) -> Option<&ChebyshevBasis> {
        match self {
            Basis::Chebyshev(b) => Some(b),
            Basis::Fourier(_) => None,
        }
    }
}

impl From<FourierBasis> for Basis {
    fn from(b: FourierBasis) -> Self {
        Basis::Fourier(b)
    }
}

impl From<ChebyshevBasis> for Basis {
    fn from(b: ChebyshevBasis) -> Self {
        Basis::Chebyshev(b)
    }
}

fn check_interval(name: &str, interval: (f64, f64)) -> Result<()> {
    let (a, b) = interval;
    if !a.is_finite() || !b.is_finite() || b <= a {
        return Err(SolverError::configuration(format!(
            "basis '{}' has an invalid interval ({}, {})",
            name, a, b
        )));
    }
    Ok(())
}

fn check_dealias(name: &str, dealias: f64) -> Result<()> {
    if !dealias.is_finite() || dealias < 1.0 {
        return Err(SolverError::configuration(format!(
            "basis '{}' needs a dealias factor >= 1 (got {})",
            name, dealias
        )));
    }
    Ok(())
}
