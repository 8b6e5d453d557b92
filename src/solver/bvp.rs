//! Direct solves of boundary-value problems.

use std::sync::Arc;

use log::info;

use crate::equations::{ModeSystem, Problem, ProblemKind};
use crate::error::{Result, SolverError};
use crate::field::Field;

use super::modes::ModeSolver;
use super::{explicit_rhs, gather_modes, scatter_modes};

/// Solves `L X = F` once per mode for a problem without time derivatives.
pub struct BoundaryValueSolver {
    problem: Problem,
    modes: ModeSolver,
    fields: Vec<Field>,
}

impl BoundaryValueSolver {
    /// Assemble and factorize every local mode.
    pub fn new(problem: Problem) -> Result<Self> {
        if problem.kind != ProblemKind::BoundaryValue {
            return Err(SolverError::configuration(
                "boundary-value solver needs a problem without time derivatives",
            ));
        }
        let systems = ModeSystem::assemble_all(&problem)?;
        info!("Built boundary-value solver: {} local modes", systems.len());
        let mut modes = ModeSolver::new(systems);
        modes.prepare(0, |s| s.boundary_value_matrix());
        let fields = problem.new_fields();
        Ok(Self {
            problem,
            modes,
            fields,
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| SolverError::configuration(format!("no field named '{}'", name)))
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    /// Evaluate the right-hand sides and solve (collective).
    ///
    /// A singular mode shows up as non-finite coefficients and is reported
    /// as an ill-posed system on every worker.
    pub fn solve(&mut self) -> Result<()> {
        let domain = Arc::clone(&self.problem.domain);
        let f = explicit_rhs(&self.problem, &self.fields)?;
        let rhs: Vec<Vec<f64>> = gather_modes(self.modes.systems(), &domain, &f)
            .into_iter()
            .zip(self.modes.systems())
            .map(|(mut r, sys)| {
                sys.impose_boundary_values(&mut r);
                r
            })
            .collect();
        let x = self.modes.solve(&rhs);

        let singular = self
            .modes
            .systems()
            .iter()
            .zip(&x)
            .find(|(_, x)| x.iter().any(|v| !v.is_finite()))
            .map(|(s, _)| s.global_modes.clone());
        let flag = if singular.is_some() { 1.0 } else { 0.0 };
        if domain.comm().all_reduce_max(flag)? > 0.0 {
            return Err(SolverError::ill_posed(match singular {
                Some(m) => format!("singular boundary-value system at mode {:?}", m),
                None => "singular boundary-value system on another worker".to_string(),
            }));
        }
        scatter_modes(self.modes.systems(), &domain, &x, &mut self.fields)
    }
}
