//! Solvers built on the per-mode systems of a [`Problem`].
//!
//! # Submodules
//!
//! - [`InitialValueSolver`]: IMEX Runge-Kutta stepping with a build/step/halt lifecycle
//! - [`BoundaryValueSolver`]: one-shot direct solve for problems without time derivatives
//! - [`Cfl`]: adaptive time step with hysteresis
//! - [`FlowProperties`]: global reductions for run-health logging

mod bvp;
mod cfl;
mod flow;
mod ivp;
mod modes;
mod state;

pub use bvp::BoundaryValueSolver;
pub use cfl::{Cfl, CflConfig};
pub use flow::{FlowProperties, PropertySummary};
pub use ivp::InitialValueSolver;
pub use modes::{ModeSolver, stage_key};
pub use state::{SolverState, SolverStatus, StopConditions};

use std::sync::Arc;

use crate::domain::Domain;
use crate::equations::{ModeSystem, Problem};
use crate::error::Result;
use crate::evaluate::GridEvaluator;
use crate::field::Field;
use crate::types::GridScale;

/// Coefficients of every equation's right-hand side, evaluated on the
/// dealiased grid (collective).
pub(crate) fn explicit_rhs(problem: &Problem, fields: &[Field]) -> Result<Vec<Vec<f64>>> {
    let mut ev = GridEvaluator::new(
        Arc::clone(&problem.domain),
        fields.iter().chain(&problem.parameter_fields),
        &problem.parameters,
        GridScale::Dealias,
    );
    problem
        .equations
        .iter()
        .map(|eq| ev.coefficients(&eq.source.rhs))
        .collect()
}

pub(crate) fn field_coefficients(fields: &[Field]) -> Result<Vec<&[f64]>> {
    fields.iter().map(|f| f.coefficients()).collect()
}

/// Per-mode vectors of coefficient-layout arrays (one array per variable or
/// equation).
pub(crate) fn gather_modes<A: AsRef<[f64]>>(
    systems: &[ModeSystem],
    domain: &Domain,
    arrays: &[A],
) -> Vec<Vec<f64>> {
    let views: Vec<&[f64]> = arrays.iter().map(|a| a.as_ref()).collect();
    systems.iter().map(|s| s.gather(domain, &views)).collect()
}

/// Write per-mode solutions back into the fields' coefficients.
pub(crate) fn scatter_modes(
    systems: &[ModeSystem],
    domain: &Domain,
    x: &[Vec<f64>],
    fields: &mut [Field],
) -> Result<()> {
    let mut arrays = vec![vec![0.0; domain.coeff_len()]; fields.len()];
    for (sys, x) in systems.iter().zip(x) {
        sys.scatter(domain, x, &mut arrays);
    }
    for (f, data) in fields.iter_mut().zip(arrays) {
        f.set_coefficient_values(data)?;
    }
    Ok(())
}
