//! Linearization of left-hand sides into constant-coefficient terms.
//!
//! Every implicit term has the form `coeff * [dt] * Π dx_a^p_a * dz^q (var)`
//! with `q <= 1`. Anything else on a left-hand side is rejected.

use std::collections::BTreeMap;

use crate::domain::Domain;
use crate::error::{Result, SolverError};
use crate::types::VariableIndex;

use super::expr::Expr;

/// One constant-coefficient term of an implicit operator.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearTerm {
    pub coeff: f64,
    pub time: bool,
    /// Derivative order along each periodic axis.
    pub dx: Vec<u32>,
    /// Derivative order along the Chebyshev axis.
    pub dz: u32,
    pub var: VariableIndex,
}

impl LinearTerm {
    fn key(&self) -> (usize, bool, u32, Vec<u32>) {
        (self.var.get(), self.time, self.dz, self.dx.clone())
    }

    fn same_operator(&self, other: &LinearTerm) -> bool {
        self.key() == other.key()
    }
}

enum Linearized {
    Scalar(f64),
    Terms(Vec<LinearTerm>),
}

/// Names the linearizer can resolve.
pub(crate) struct SymbolTable<'a> {
    pub domain: &'a Domain,
    pub variables: &'a [String],
    pub parameters: &'a BTreeMap<String, f64>,
}

impl SymbolTable<'_> {
    fn variable(&self, name: &str) -> Option<VariableIndex> {
        self.variables
            .iter()
            .position(|v| v == name)
            .map(VariableIndex::new)
    }

    /// Reduce `expr` to merged, sorted linear terms.
    pub fn linearize(&self, expr: &Expr) -> Result<Vec<LinearTerm>> {
        match self.walk(expr)? {
            Linearized::Terms(terms) => Ok(normalize(terms)),
            Linearized::Scalar(v) if v == 0.0 => Ok(Vec::new()),
            Linearized::Scalar(_) => Err(SolverError::malformed(format!(
                "left-hand side '{}' has a term without an unknown; move it to the right-hand side",
                expr
            ))),
        }
    }

    fn walk(&self, expr: &Expr) -> Result<Linearized> {
        use Linearized::{Scalar, Terms};
        Ok(match expr {
            Expr::Field(name) => {
                let var = self.variable(name).ok_or_else(|| {
                    SolverError::malformed(format!(
                        "'{}' is not an unknown and cannot appear on a left-hand side",
                        name
                    ))
                })?;
                Terms(vec![LinearTerm {
                    coeff: 1.0,
                    time: false,
                    dx: vec![0; self.domain.n_periodic()],
                    dz: 0,
                    var,
                }])
            }
            Expr::Const(c) => Scalar(*c),
            Expr::Param(name) => Scalar(*self.parameters.get(name).ok_or_else(|| {
                SolverError::malformed(format!("unknown parameter '{}'", name))
            })?),
            Expr::Add(a, b) | Expr::Sub(a, b) => {
                let sign = if matches!(expr, Expr::Sub(..)) { -1.0 } else { 1.0 };
                match (self.walk(a)?, self.walk(b)?) {
                    (Scalar(x), Scalar(y)) => Scalar(x + sign * y),
                    (Terms(mut x), Terms(y)) => {
                        x.extend(scale(y, sign));
                        Terms(x)
                    }
                    (Terms(t), Scalar(s)) | (Scalar(s), Terms(t)) if s == 0.0 => Terms(t),
                    _ => {
                        return Err(SolverError::malformed(format!(
                            "left-hand side '{}' mixes unknowns with a constant offset",
                            expr
                        )));
                    }
                }
            }
            Expr::Mul(a, b) => match (self.walk(a)?, self.walk(b)?) {
                (Scalar(x), Scalar(y)) => Scalar(x * y),
                (Scalar(s), Terms(t)) | (Terms(t), Scalar(s)) => Terms(scale(t, s)),
                (Terms(_), Terms(_)) => {
                    return Err(SolverError::malformed(format!(
                        "left-hand side '{}' is nonlinear in the unknowns",
                        expr
                    )));
                }
            },
            Expr::Neg(a) => match self.walk(a)? {
                Scalar(x) => Scalar(-x),
                Terms(t) => Terms(scale(t, -1.0)),
            },
            Expr::Diff { axis, arg } => {
                let index = self.domain.axis_index(axis).ok_or_else(|| {
                    SolverError::malformed(format!("unknown axis '{}' in '{}'", axis, expr))
                })?;
                match self.walk(arg)? {
                    Scalar(_) => Scalar(0.0),
                    Terms(mut t) => {
                        for term in &mut t {
                            if index == self.domain.z_axis() {
                                term.dz += 1;
                                if term.dz > 1 {
                                    return Err(SolverError::malformed(format!(
                                        "'{}' has a second derivative along '{}'; introduce a first-order auxiliary",
                                        expr, axis
                                    )));
                                }
                            } else {
                                term.dx[index] += 1;
                            }
                        }
                        Terms(t)
                    }
                }
            }
            Expr::TimeDeriv(arg) => match self.walk(arg)? {
                Scalar(_) => Scalar(0.0),
                Terms(mut t) => {
                    for term in &mut t {
                        if term.time {
                            return Err(SolverError::malformed(format!(
                                "nested time derivative in '{}'",
                                expr
                            )));
                        }
                        term.time = true;
                    }
                    Terms(t)
                }
            },
            Expr::Coord(_) => {
                return Err(SolverError::malformed(format!(
                    "left-hand side '{}' has a non-constant coefficient",
                    expr
                )));
            }
            Expr::Apply { .. } | Expr::Integrate(_) | Expr::IntegrateAxis { .. } => {
                return Err(SolverError::malformed(format!(
                    "'{}' cannot be treated implicitly",
                    expr
                )));
            }
        })
    }
}

fn scale(terms: Vec<LinearTerm>, factor: f64) -> Vec<LinearTerm> {
    terms
        .into_iter()
        .map(|mut t| {
            t.coeff *= factor;
            t
        })
        .collect()
}

/// Merge like terms, drop zeros and sort by operator.
pub fn normalize(terms: Vec<LinearTerm>) -> Vec<LinearTerm> {
    let mut merged: Vec<LinearTerm> = Vec::new();
    for t in terms {
        match merged.iter_mut().find(|m| m.same_operator(&t)) {
            Some(m) => m.coeff += t.coeff,
            None => merged.push(t),
        }
    }
    merged.retain(|t| t.coeff != 0.0);
    merged.sort_by(|a, b| a.key().cmp(&b.key()));
    merged
}

/// Whether two normalized term lists are the same operator up to a nonzero
/// scale factor.
pub fn proportional(a: &[LinearTerm], b: &[LinearTerm]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    let ratio = b[0].coeff / a[0].coeff;
    a.iter().zip(b).all(|(x, y)| {
        x.same_operator(y) && (y.coeff - ratio * x.coeff).abs() <= 1e-12 * y.coeff.abs().max(1.0)
    })
}
