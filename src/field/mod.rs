//! Fields with explicit grid/coefficient representations.
//!
//! A [`Field`] holds grid values (at its current [`GridScale`]) and
//! coefficient values in the domain's local layouts. The
//! [`Representation`] tag records which of the two is current. Reading a
//! stale representation is an error; conversions only happen when
//! [`Field::to_grid`] or [`Field::to_coefficient`] is called.

mod trace;

pub use trace::BoundaryTrace;

use std::sync::Arc;

use crate::domain::Domain;
use crate::error::{Result, SolverError};
use crate::operators::{boundary_row, differentiate_coefficients};
use crate::types::{GridScale, Side};

/// Which representation of a field is current.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    GridValid,
    CoefficientValid,
    Both,
}

impl Representation {
    pub fn grid_valid(self) -> bool {
        matches!(self, Representation::GridValid | Representation::Both)
    }

    pub fn coefficients_valid(self) -> bool {
        matches!(self, Representation::CoefficientValid | Representation::Both)
    }
}

/// Per-field boundary metadata along the Chebyshev axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldMeta {
    /// Boundary conditions on this field are essential: the implicit solve
    /// uses the Dirichlet recombined basis for it.
    pub dirichlet: bool,
}

/// A scalar field bound to a [`Domain`].
#[derive(Clone, Debug)]
pub struct Field {
    name: String,
    domain: Arc<Domain>,
    scale: GridScale,
    grid: Vec<f64>,
    coeffs: Vec<f64>,
    state: Representation,
    meta: FieldMeta,
}

impl Field {
    /// Zero field; both representations start valid.
    pub fn new(domain: Arc<Domain>, name: impl Into<String>) -> Self {
        let grid = vec![0.0; domain.grid_len(GridScale::Unit)];
        let coeffs = vec![0.0; domain.coeff_len()];
        Self {
            name: name.into(),
            domain,
            scale: GridScale::Unit,
            grid,
            coeffs,
            state: Representation::Both,
            meta: FieldMeta::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The same field under another name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn representation(&self) -> Representation {
        self.state
    }

    pub fn scale(&self) -> GridScale {
        self.scale
    }

    pub fn meta(&self) -> FieldMeta {
        self.meta
    }

    pub fn set_dirichlet(&mut self, dirichlet: bool) {
        self.meta.dirichlet = dirichlet;
    }

    /// Move grid space to another scale.
    ///
    /// The coefficients are brought up to date first, so only the grid
    /// representation becomes stale.
    pub fn set_scale(&mut self, scale: GridScale) -> Result<()> {
        if scale == self.scale {
            return Ok(());
        }
        self.to_coefficient()?;
        self.scale = scale;
        self.grid = vec![0.0; self.domain.grid_len(scale)];
        self.state = Representation::CoefficientValid;
        Ok(())
    }

    /// Local grid values at the current scale.
    pub fn grid(&self) -> Result<&[f64]> {
        if !self.state.grid_valid() {
            return Err(SolverError::stale(format!(
                "grid values of '{}' read while only coefficients are current",
                self.name
            )));
        }
        Ok(&self.grid)
    }

    /// Local coefficient values.
    pub fn coefficients(&self) -> Result<&[f64]> {
        if !self.state.coefficients_valid() {
            return Err(SolverError::stale(format!(
                "coefficients of '{}' read while only grid values are current",
                self.name
            )));
        }
        Ok(&self.coeffs)
    }

    /// Replace the grid values; coefficients become stale.
    pub fn set_grid_values(&mut self, values: Vec<f64>) -> Result<()> {
        let expected = self.domain.grid_len(self.scale);
        if values.len() != expected {
            return Err(SolverError::configuration(format!(
                "'{}' expects {} grid values, got {}",
                self.name,
                expected,
                values.len()
            )));
        }
        self.grid = values;
        self.state = Representation::GridValid;
        Ok(())
    }

    /// Replace the coefficients; grid values become stale.
    pub fn set_coefficient_values(&mut self, values: Vec<f64>) -> Result<()> {
        let expected = self.domain.coeff_len();
        if values.len() != expected {
            return Err(SolverError::configuration(format!(
                "'{}' expects {} coefficients, got {}",
                self.name,
                expected,
                values.len()
            )));
        }
        self.coeffs = values;
        self.state = Representation::CoefficientValid;
        Ok(())
    }

    /// Fill grid values from a function of the coordinates at each point.
    pub fn set_grid_fn<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&[f64]) -> f64,
    {
        let coords: Vec<Vec<f64>> = (0..self.domain.dim())
            .map(|axis| self.domain.local_coordinate(axis, self.scale))
            .collect();
        let mut point = vec![0.0; coords.len()];
        let values = (0..self.domain.grid_len(self.scale))
            .map(|i| {
                for (p, c) in point.iter_mut().zip(&coords) {
                    *p = c[i];
                }
                f(&point)
            })
            .collect();
        self.set_grid_values(values)
    }

    /// Bring grid values up to date (collective when they are stale).
    pub fn to_grid(&mut self) -> Result<()> {
        if self.state == Representation::CoefficientValid {
            self.grid = self.domain.backward(&self.coeffs, self.scale)?;
            self.state = Representation::Both;
        }
        Ok(())
    }

    /// Bring coefficients up to date (collective when they are stale).
    pub fn to_coefficient(&mut self) -> Result<()> {
        if self.state == Representation::GridValid {
            self.coeffs = self.domain.forward(&self.grid, self.scale)?;
            self.state = Representation::Both;
        }
        Ok(())
    }

    /// New field holding the derivative along `axis`, coefficients current.
    pub fn differentiate(&self, axis: usize) -> Result<Field> {
        if axis >= self.domain.dim() {
            return Err(SolverError::configuration(format!(
                "axis {} out of range for a {}-dimensional domain",
                axis,
                self.domain.dim()
            )));
        }
        let coeffs = differentiate_coefficients(&self.domain, self.coefficients()?, axis);
        let name = format!("d{}({})", self.domain.basis(axis).name(), self.name);
        let mut out = Field::new(Arc::clone(&self.domain), name);
        out.scale = self.scale;
        out.grid = vec![0.0; self.domain.grid_len(self.scale)];
        out.coeffs = coeffs;
        out.state = Representation::CoefficientValid;
        Ok(out)
    }

    /// Restrict the field to one end of the Chebyshev axis.
    pub fn evaluate_boundary(&self, axis: usize, side: Side) -> Result<BoundaryTrace> {
        if axis != self.domain.z_axis() {
            return Err(SolverError::configuration(format!(
                "boundary evaluation needs the Chebyshev axis, got axis {}",
                axis
            )));
        }
        let nz = self.domain.nz();
        let row = boundary_row(nz, side);
        let values = self
            .coefficients()?
            .chunks(nz)
            .map(|pencil| pencil.iter().zip(&row).map(|(c, r)| c * r).sum())
            .collect();
        Ok(BoundaryTrace::new(Arc::clone(&self.domain), side, values))
    }

    /// Volume integral (collective).
    pub fn integrate(&self) -> Result<f64> {
        self.domain.integrate_coefficients(self.coefficients()?)
    }

    /// Assemble the global grid on rank 0 (collective).
    pub fn gather_grid(&self) -> Result<Option<Vec<f64>>> {
        self.domain.gather_grid(self.grid()?, self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::parallel::SerialCommunicator;
    use std::f64::consts::PI;

    fn domain(nx: usize, nz: usize) -> Arc<Domain> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", nx, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", nz, (-1.0, 1.0)).unwrap().into(),
        ];
        Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
    }

    #[test]
    fn test_stale_reads_are_errors() {
        let mut f = Field::new(domain(8, 8), "f");
        f.set_grid_fn(|p| p[0] + p[1]).unwrap();
        assert!(matches!(f.coefficients(), Err(SolverError::StaleState(_))));
        f.to_coefficient().unwrap();
        assert_eq!(f.representation(), Representation::Both);
        let c = f.coefficients().unwrap().to_vec();
        f.set_coefficient_values(c).unwrap();
        assert!(matches!(f.grid(), Err(SolverError::StaleState(_))));
    }

    #[test]
    fn test_roundtrip_is_idempotent() {
        let mut f = Field::new(domain(16, 12), "f");
        f.set_grid_fn(|p| (PI * p[0]).sin() * p[1].powi(3) + 0.25).unwrap();
        let original = f.grid().unwrap().to_vec();
        f.to_coefficient().unwrap();
        let c = f.coefficients().unwrap().to_vec();
        f.set_coefficient_values(c).unwrap();
        f.to_grid().unwrap();
        for (a, b) in original.iter().zip(f.grid().unwrap()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_boundary_trace() {
        let mut f = Field::new(domain(8, 8), "f");
        f.set_grid_fn(|p| (PI * p[0]).cos() * (1.0 + p[1])).unwrap();
        f.to_coefficient().unwrap();
        let top = f.evaluate_boundary(1, Side::Right).unwrap();
        let bottom = f.evaluate_boundary(1, Side::Left).unwrap();
        let x = f.domain().global_grid(0, GridScale::Unit);
        let top_grid = top.to_grid(GridScale::Unit).unwrap();
        for (xi, v) in x.iter().zip(&top_grid) {
            assert!((v - 2.0 * (PI * xi).cos()).abs() < 1e-12);
        }
        for v in bottom.to_grid(GridScale::Unit).unwrap() {
            assert!(v.abs() < 1e-12);
        }
        assert!(f.evaluate_boundary(0, Side::Left).is_err());
    }
}
