//! Problem description and compilation.
//!
//! A [`ProblemBuilder`] collects unknowns, parameters, equations and boundary
//! conditions; [`ProblemBuilder::build`] validates them and produces a
//! [`Problem`] whose per-mode operators can be assembled.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};

use crate::domain::Domain;
use crate::error::{Result, SolverError};
use crate::field::Field;
use crate::types::{AxisIndex, GridScale, Side};

use super::expr::Expr;
use super::linear::{LinearTerm, SymbolTable, proportional};

/// `lhs = rhs`, with `lhs` linear in the unknowns and `rhs` evaluated
/// explicitly in grid space.
#[derive(Clone, Debug)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Which periodic modes a boundary condition applies to.
#[derive(Clone, Debug, PartialEq)]
pub enum ModeCondition {
    Always,
    ModeEquals { axis: String, mode: usize },
    ModeNotEquals { axis: String, mode: usize },
}

impl ModeCondition {
    pub fn mode_equals(axis: impl Into<String>, mode: usize) -> Self {
        Self::ModeEquals {
            axis: axis.into(),
            mode,
        }
    }

    pub fn mode_not_equals(axis: impl Into<String>, mode: usize) -> Self {
        Self::ModeNotEquals {
            axis: axis.into(),
            mode,
        }
    }
}

/// `lhs(side) = rhs` on one end of the Chebyshev axis.
#[derive(Clone, Debug)]
pub struct BoundaryCondition {
    pub side: Side,
    pub lhs: Expr,
    pub rhs: Expr,
    pub condition: ModeCondition,
}

/// Initial-value problems carry time derivatives; boundary-value ones do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemKind {
    InitialValue,
    BoundaryValue,
}

/// Mode condition with its axis resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResolvedCondition {
    Always,
    Equals(AxisIndex, usize),
    NotEquals(AxisIndex, usize),
}

impl ResolvedCondition {
    pub fn applies(self, global_modes: &[usize]) -> bool {
        match self {
            ResolvedCondition::Always => true,
            ResolvedCondition::Equals(axis, m) => global_modes[axis.get()] == m,
            ResolvedCondition::NotEquals(axis, m) => global_modes[axis.get()] != m,
        }
    }
}

/// A validated equation.
#[derive(Clone, Debug)]
pub struct CompiledEquation {
    pub source: Equation,
    pub terms: Vec<LinearTerm>,
    /// Contains a Chebyshev derivative, so its last row per component is a
    /// tau row replaced by a boundary condition.
    pub has_tau: bool,
}

/// A validated boundary condition.
#[derive(Clone, Debug)]
pub struct CompiledBoundary {
    pub source: BoundaryCondition,
    pub terms: Vec<LinearTerm>,
    pub(crate) condition: ResolvedCondition,
    /// Right-hand side in this worker's `[2 Mx / P, (Ny)]` periodic block.
    pub rhs_coeffs: Vec<f64>,
}

/// Collects the pieces of a problem before validation.
pub struct ProblemBuilder {
    domain: Arc<Domain>,
    variables: Vec<String>,
    auxiliaries: Vec<(String, Expr)>,
    parameters: BTreeMap<String, f64>,
    parameter_fields: Vec<Field>,
    equations: Vec<Equation>,
    boundaries: Vec<BoundaryCondition>,
    dirichlet: Vec<String>,
}

impl ProblemBuilder {
    pub fn new(domain: Arc<Domain>, variables: &[&str]) -> Self {
        Self {
            domain,
            variables: variables.iter().map(|v| v.to_string()).collect(),
            auxiliaries: Vec::new(),
            parameters: BTreeMap::new(),
            parameter_fields: Vec::new(),
            equations: Vec::new(),
            boundaries: Vec::new(),
            dirichlet: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// A known field usable on right-hand sides, renamed to `name`.
    pub fn parameter_field(mut self, name: impl Into<String>, field: &Field) -> Self {
        self.parameter_fields.push(field.clone().with_name(name));
        self
    }

    /// Declare `name` as the first-order auxiliary `name = definition`.
    pub fn declare_auxiliary(mut self, name: impl Into<String>, definition: Expr) -> Self {
        self.auxiliaries.push((name.into(), definition));
        self
    }

    pub fn equation(mut self, lhs: Expr, rhs: Expr) -> Self {
        self.equations.push(Equation { lhs, rhs });
        self
    }

    pub fn boundary(mut self, side: Side, lhs: Expr, rhs: Expr, condition: ModeCondition) -> Self {
        self.boundaries.push(BoundaryCondition {
            side,
            lhs,
            rhs,
            condition,
        });
        self
    }

    /// Mark unknowns whose boundary conditions are essential; they are
    /// solved in the Dirichlet recombined basis.
    pub fn dirichlet(mut self, names: &[&str]) -> Self {
        self.dirichlet.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Validate and compile the problem.
    pub fn build(self) -> Result<Problem> {
        let domain = Arc::clone(&self.domain);
        let table = SymbolTable {
            domain: &domain,
            variables: &self.variables,
            parameters: &self.parameters,
        };

        self.check_names()?;
        if self.equations.len() != self.variables.len() {
            return Err(SolverError::malformed(format!(
                "{} equations for {} unknowns",
                self.equations.len(),
                self.variables.len()
            )));
        }

        let mut equations = Vec::with_capacity(self.equations.len());
        for eq in &self.equations {
            let terms = table.linearize(&eq.lhs)?;
            if terms.is_empty() {
                return Err(SolverError::malformed(format!(
                    "equation '{} = {}' has no implicit terms",
                    eq.lhs, eq.rhs
                )));
            }
            self.check_rhs(&eq.rhs, true)?;
            let has_tau = terms.iter().any(|t| t.dz > 0);
            equations.push(CompiledEquation {
                source: eq.clone(),
                terms,
                has_tau,
            });
        }

        let aux_vars = self.check_auxiliaries(&table, &equations)?;
        for eq in &equations {
            if let Some(t) = eq.terms.iter().find(|t| t.time && aux_vars.contains(&t.var.get())) {
                return Err(SolverError::malformed(format!(
                    "auxiliary '{}' has a time derivative in '{}'",
                    self.variables[t.var.get()],
                    eq.source.lhs
                )));
            }
        }
        for (i, var) in self.variables.iter().enumerate() {
            if !equations.iter().any(|e| e.terms.iter().any(|t| t.var.get() == i)) {
                return Err(SolverError::malformed(format!(
                    "unknown '{}' never appears on a left-hand side",
                    var
                )));
            }
        }

        let boundaries = self.compile_boundaries(&table)?;
        let n_tau = equations.iter().filter(|e| e.has_tau).count();
        check_coverage(&domain, &boundaries, n_tau)?;

        let kind = if equations.iter().any(|e| e.terms.iter().any(|t| t.time)) {
            ProblemKind::InitialValue
        } else {
            ProblemKind::BoundaryValue
        };
        let dirichlet = self
            .variables
            .iter()
            .map(|v| self.dirichlet.contains(v))
            .collect();

        info!(
            "Problem compiled: {:?}, {} unknowns, {} tau equations, {} boundary conditions",
            kind,
            self.variables.len(),
            n_tau,
            boundaries.len()
        );
        Ok(Problem {
            domain,
            variables: self.variables,
            auxiliaries: self.auxiliaries.into_iter().map(|(n, _)| n).collect(),
            parameters: self.parameters,
            parameter_fields: self.parameter_fields,
            equations,
            boundaries,
            dirichlet,
            kind,
        })
    }

    fn check_names(&self) -> Result<()> {
        for (i, v) in self.variables.iter().enumerate() {
            if self.variables[..i].contains(v) {
                return Err(SolverError::malformed(format!("unknown '{}' declared twice", v)));
            }
            if self.domain.axis_index(v).is_some() || self.parameters.contains_key(v) {
                return Err(SolverError::malformed(format!(
                    "unknown '{}' shadows an axis or parameter",
                    v
                )));
            }
        }
        for name in &self.dirichlet {
            if !self.variables.contains(name) {
                return Err(SolverError::malformed(format!(
                    "dirichlet meta on '{}', which is not an unknown",
                    name
                )));
            }
        }
        for f in &self.parameter_fields {
            if self.variables.iter().any(|v| v == f.name()) {
                return Err(SolverError::malformed(format!(
                    "parameter field '{}' shadows an unknown",
                    f.name()
                )));
            }
        }
        Ok(())
    }

    /// Right-hand sides may use unknowns, parameter fields, parameters and
    /// axes, but no time derivatives.
    fn check_rhs(&self, rhs: &Expr, allow_fields: bool) -> Result<()> {
        if rhs.contains_time_derivative() {
            return Err(SolverError::malformed(format!(
                "right-hand side '{}' has a time derivative",
                rhs
            )));
        }
        let symbols = rhs.symbols();
        for f in &symbols.fields {
            let known = self.variables.contains(f)
                || self.parameter_fields.iter().any(|p| p.name() == f);
            if !allow_fields || !known {
                return Err(SolverError::malformed(format!(
                    "right-hand side '{}' refers to field '{}', which is not available there",
                    rhs, f
                )));
            }
        }
        if let Some(p) = symbols.params.iter().find(|p| !self.parameters.contains_key(*p)) {
            return Err(SolverError::malformed(format!("unknown parameter '{}'", p)));
        }
        if let Some(a) = symbols.axes.iter().find(|a| self.domain.axis_index(a).is_none()) {
            return Err(SolverError::malformed(format!("unknown axis '{}'", a)));
        }
        Ok(())
    }

    /// Each declared auxiliary must be defined by exactly one equation
    /// `name - definition = 0`, up to scale. Returns the auxiliary slots.
    fn check_auxiliaries(
        &self,
        table: &SymbolTable<'_>,
        equations: &[CompiledEquation],
    ) -> Result<Vec<usize>> {
        let mut slots = Vec::new();
        for (name, definition) in &self.auxiliaries {
            let slot = self.variables.iter().position(|v| v == name).ok_or_else(|| {
                SolverError::malformed(format!("auxiliary '{}' is not an unknown", name))
            })?;
            if slots.contains(&slot) {
                return Err(SolverError::malformed(format!(
                    "auxiliary '{}' declared twice",
                    name
                )));
            }
            let target = table.linearize(&(Expr::Field(name.clone()) - definition.clone()))?;
            if target.iter().any(|t| t.time) {
                return Err(SolverError::malformed(format!(
                    "auxiliary '{}' is defined through a time derivative",
                    name
                )));
            }
            let matches = equations
                .iter()
                .filter(|e| e.source.rhs.is_zero() && proportional(&target, &e.terms))
                .count();
            match matches {
                0 => {
                    return Err(SolverError::malformed(format!(
                        "no equation defines auxiliary '{}' as {}",
                        name, definition
                    )));
                }
                1 => {}
                _ => {
                    return Err(SolverError::malformed(format!(
                        "auxiliary '{}' is defined by {} equations",
                        name, matches
                    )));
                }
            }
            slots.push(slot);
        }
        Ok(slots)
    }

    fn compile_boundaries(&self, table: &SymbolTable<'_>) -> Result<Vec<CompiledBoundary>> {
        let domain = &self.domain;
        let mut out = Vec::with_capacity(self.boundaries.len());
        for bc in &self.boundaries {
            let terms = table.linearize(&bc.lhs)?;
            if terms.is_empty() {
                return Err(SolverError::malformed(format!(
                    "boundary condition '{}({})' has no unknowns",
                    bc.side, bc.lhs
                )));
            }
            if terms.iter().any(|t| t.time || t.dz > 0) {
                return Err(SolverError::malformed(format!(
                    "boundary condition '{}({})' may only use unknowns and periodic derivatives",
                    bc.side, bc.lhs
                )));
            }
            self.check_rhs(&bc.rhs, false)?;

            let condition = match &bc.condition {
                ModeCondition::Always => ResolvedCondition::Always,
                ModeCondition::ModeEquals { axis, mode } => {
                    ResolvedCondition::Equals(self.periodic_axis(axis)?, *mode)
                }
                ModeCondition::ModeNotEquals { axis, mode } => {
                    ResolvedCondition::NotEquals(self.periodic_axis(axis)?, *mode)
                }
            };
            let rhs_coeffs = boundary_rhs(domain, &bc.rhs, bc.side, &self.parameters)?;
            out.push(CompiledBoundary {
                source: bc.clone(),
                terms,
                condition,
                rhs_coeffs,
            });
        }
        Ok(out)
    }

    fn periodic_axis(&self, name: &str) -> Result<AxisIndex> {
        match self.domain.axis_index(name) {
            Some(i) if i < self.domain.n_periodic() => Ok(AxisIndex::new(i)),
            _ => Err(SolverError::malformed(format!(
                "mode condition on '{}', which is not a periodic axis",
                name
            ))),
        }
    }
}

/// Evaluate a boundary right-hand side on the full periodic grid and
/// transform it to this worker's block of periodic coefficients.
fn boundary_rhs(
    domain: &Domain,
    rhs: &Expr,
    side: Side,
    parameters: &BTreeMap<String, f64>,
) -> Result<Vec<f64>> {
    let scale = GridScale::Unit;
    let z = domain.z_axis();
    let (z0, z1) = domain.basis(z).interval();
    let z_value = match side {
        Side::Left => z0,
        Side::Right => z1,
    };
    let shape: Vec<usize> = (0..z).map(|a| domain.basis(a).grid_size(scale)).collect();
    let grids: Vec<Vec<f64>> = (0..z).map(|a| domain.global_grid(a, scale)).collect();
    let n: usize = shape.iter().product();

    let mut values = Vec::with_capacity(n);
    let mut point = vec![0.0; domain.dim()];
    point[z] = z_value;
    for flat in 0..n {
        let mut rest = flat;
        for a in (0..z).rev() {
            point[a] = grids[a][rest % shape[a]];
            rest /= shape[a];
        }
        values.push(eval_point(domain, rhs, &point, parameters)?);
    }
    debug!("boundary right-hand side '{}' sampled on {} points", rhs, n);
    domain.periodic_forward(&values, scale)
}

fn eval_point(
    domain: &Domain,
    expr: &Expr,
    point: &[f64],
    parameters: &BTreeMap<String, f64>,
) -> Result<f64> {
    let ev = |e: &Expr| eval_point(domain, e, point, parameters);
    Ok(match expr {
        Expr::Const(c) => *c,
        Expr::Param(p) => *parameters
            .get(p)
            .ok_or_else(|| SolverError::malformed(format!("unknown parameter '{}'", p)))?,
        Expr::Coord(axis) => {
            let i = domain
                .axis_index(axis)
                .ok_or_else(|| SolverError::malformed(format!("unknown axis '{}'", axis)))?;
            point[i]
        }
        Expr::Add(a, b) => ev(a)? + ev(b)?,
        Expr::Sub(a, b) => ev(a)? - ev(b)?,
        Expr::Mul(a, b) => ev(a)? * ev(b)?,
        Expr::Neg(a) => -ev(a)?,
        Expr::Apply { func, arg } => func.apply(ev(arg)?),
        other => {
            return Err(SolverError::malformed(format!(
                "boundary values must be explicit functions of the coordinates, got '{}'",
                other
            )));
        }
    })
}

/// Check that every periodic mode has exactly one boundary condition per
/// tau equation, with no two sharing a side and operator.
///
/// All global modes are checked so every worker reaches the same verdict.
fn check_coverage(domain: &Domain, boundaries: &[CompiledBoundary], n_tau: usize) -> Result<()> {
    let counts: Vec<usize> = (0..domain.n_periodic())
        .map(|a| domain.basis(a).size() / 2)
        .collect();
    let total: usize = counts.iter().product();
    let mut modes = vec![0; counts.len()];
    for flat in 0..total {
        let mut rest = flat;
        for a in (0..counts.len()).rev() {
            modes[a] = rest % counts[a];
            rest /= counts[a];
        }
        let active: Vec<&CompiledBoundary> = boundaries
            .iter()
            .filter(|b| b.condition.applies(&modes))
            .collect();
        for (i, a) in active.iter().enumerate() {
            if let Some(b) = active[..i]
                .iter()
                .find(|b| b.source.side == a.source.side && proportional(&b.terms, &a.terms))
            {
                return Err(SolverError::ill_posed(format!(
                    "boundary conditions '{}({})' and '{}({})' both apply to mode {:?}",
                    b.source.side, b.source.lhs, a.source.side, a.source.lhs, modes
                )));
            }
        }
        if active.len() != n_tau {
            return Err(SolverError::ill_posed(format!(
                "mode {:?} has {} applicable boundary conditions for {} tau equations",
                modes,
                active.len(),
                n_tau
            )));
        }
    }
    Ok(())
}

/// A validated problem, ready for per-mode assembly.
#[derive(Clone, Debug)]
pub struct Problem {
    pub domain: Arc<Domain>,
    pub variables: Vec<String>,
    pub auxiliaries: Vec<String>,
    pub parameters: BTreeMap<String, f64>,
    pub parameter_fields: Vec<Field>,
    pub equations: Vec<CompiledEquation>,
    pub boundaries: Vec<CompiledBoundary>,
    /// Dirichlet recombination flag per unknown.
    pub dirichlet: Vec<bool>,
    pub kind: ProblemKind,
}

impl Problem {
    /// Fresh zero fields for every unknown, with their metadata applied.
    pub fn new_fields(&self) -> Vec<Field> {
        self.variables
            .iter()
            .zip(&self.dirichlet)
            .map(|(name, &d)| {
                let mut f = Field::new(Arc::clone(&self.domain), name.as_str());
                f.set_dirichlet(d);
                f
            })
            .collect()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }
}
