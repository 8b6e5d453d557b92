//! Grid-space evaluation of operator trees.
//!
//! Products and functions are taken pointwise on the grid at the evaluation
//! scale (dealiased for right-hand sides); derivatives and integrals go
//! through coefficient space. Every worker walks the same tree in the same
//! order, so the transposes inside `backward`/`forward` line up.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::Domain;
use crate::equations::Expr;
use crate::error::{Result, SolverError};
use crate::field::Field;
use crate::operators::differentiate_coefficients;
use crate::types::GridScale;

/// Result of evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    /// Local grid values at the evaluation scale.
    Grid(Vec<f64>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Grid(_) => None,
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(v)),
            Value::Grid(mut g) => {
                g.iter_mut().for_each(|v| *v = f(*v));
                Value::Grid(g)
            }
        }
    }

    fn zip(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Scalar(a), Value::Grid(mut g)) => {
                g.iter_mut().for_each(|v| *v = f(a, *v));
                Value::Grid(g)
            }
            (Value::Grid(mut g), Value::Scalar(b)) => {
                g.iter_mut().for_each(|v| *v = f(*v, b));
                Value::Grid(g)
            }
            (Value::Grid(mut a), Value::Grid(b)) => {
                a.iter_mut().zip(b).for_each(|(x, y)| *x = f(*x, y));
                Value::Grid(a)
            }
        }
    }
}

/// Evaluates expressions against a set of named fields.
///
/// Field grids and derivatives are cached for the lifetime of the
/// evaluator, so build a new one after the fields change.
pub struct GridEvaluator<'a> {
    domain: Arc<Domain>,
    fields: HashMap<&'a str, &'a Field>,
    parameters: &'a BTreeMap<String, f64>,
    scale: GridScale,
    cache: HashMap<String, Vec<f64>>,
}

impl<'a> GridEvaluator<'a> {
    pub fn new(
        domain: Arc<Domain>,
        fields: impl IntoIterator<Item = &'a Field>,
        parameters: &'a BTreeMap<String, f64>,
        scale: GridScale,
    ) -> Self {
        Self {
            domain,
            fields: fields.into_iter().map(|f| (f.name(), f)).collect(),
            parameters,
            scale,
            cache: HashMap::new(),
        }
    }

    pub fn scale(&self) -> GridScale {
        self.scale
    }

    /// Evaluate `expr` (collective).
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Const(c) => Ok(Value::Scalar(*c)),
            Expr::Param(name) => match self.parameters.get(name) {
                Some(v) => Ok(Value::Scalar(*v)),
                None => self.field_grid(name).map(Value::Grid),
            },
            Expr::Field(name) => self.field_grid(name).map(Value::Grid),
            Expr::Coord(axis) => {
                let index = self.axis(axis)?;
                Ok(Value::Grid(self.domain.local_coordinate(index, self.scale)))
            }
            Expr::Add(a, b) => Ok(self.evaluate(a)?.zip(self.evaluate(b)?, |x, y| x + y)),
            Expr::Sub(a, b) => Ok(self.evaluate(a)?.zip(self.evaluate(b)?, |x, y| x - y)),
            Expr::Mul(a, b) => Ok(self.evaluate(a)?.zip(self.evaluate(b)?, |x, y| x * y)),
            Expr::Neg(a) => Ok(self.evaluate(a)?.map(|x| -x)),
            Expr::Apply { func, arg } => {
                let func = *func;
                Ok(self.evaluate(arg)?.map(|x| func.apply(x)))
            }
            Expr::Diff { axis, arg } => {
                let key = expr.to_string();
                if let Some(hit) = self.cache.get(&key) {
                    return Ok(Value::Grid(hit.clone()));
                }
                let index = self.axis(axis)?;
                let coeffs = self.coefficients(arg)?;
                let derivative = differentiate_coefficients(&self.domain, &coeffs, index);
                let grid = self.domain.backward(&derivative, self.scale)?;
                self.cache.insert(key, grid.clone());
                Ok(Value::Grid(grid))
            }
            Expr::Integrate(arg) => match self.evaluate(arg)? {
                Value::Scalar(c) => Ok(Value::Scalar(c * self.domain.volume())),
                Value::Grid(g) => {
                    let coeffs = self.domain.forward(&g, self.scale)?;
                    Ok(Value::Scalar(self.domain.integrate_coefficients(&coeffs)?))
                }
            },
            Expr::IntegrateAxis { axis, arg } => {
                let index = self.axis(axis)?;
                match self.evaluate(arg)? {
                    Value::Scalar(c) => Ok(Value::Scalar(c * self.domain.basis(index).length())),
                    Value::Grid(g) => Ok(Value::Grid(
                        self.domain.integrate_axis_grid(&g, index, self.scale)?,
                    )),
                }
            }
            Expr::TimeDeriv(_) => Err(SolverError::malformed(format!(
                "time derivative in explicit expression '{}'",
                expr
            ))),
        }
    }

    /// Local coefficients of `expr` (collective).
    ///
    /// Scalars become constant fields; a zero expression skips the
    /// transforms entirely.
    pub fn coefficients(&mut self, expr: &Expr) -> Result<Vec<f64>> {
        if expr.is_zero() {
            return Ok(vec![0.0; self.domain.coeff_len()]);
        }
        if let Expr::Field(name) = expr {
            if let Some(f) = self.fields.get(name.as_str()) {
                if f.representation().coefficients_valid() {
                    return Ok(f.coefficients()?.to_vec());
                }
            }
        }
        let grid = match self.evaluate(expr)? {
            Value::Grid(g) => g,
            Value::Scalar(c) => vec![c; self.domain.grid_len(self.scale)],
        };
        self.domain.forward(&grid, self.scale)
    }

    /// `expr` as a new coefficient-valid field named `name`.
    pub fn to_field(&mut self, name: &str, expr: &Expr) -> Result<Field> {
        let coeffs = self.coefficients(expr)?;
        let mut out = Field::new(Arc::clone(&self.domain), name);
        out.set_coefficient_values(coeffs)?;
        Ok(out)
    }

    fn axis(&self, name: &str) -> Result<usize> {
        self.domain
            .axis_index(name)
            .ok_or_else(|| SolverError::malformed(format!("unknown axis '{}'", name)))
    }

    fn field_grid(&mut self, name: &str) -> Result<Vec<f64>> {
        if let Some(hit) = self.cache.get(name) {
            return Ok(hit.clone());
        }
        let f = *self
            .fields
            .get(name)
            .ok_or_else(|| SolverError::malformed(format!("unknown field '{}'", name)))?;
        let grid = if f.scale() == self.scale && f.representation().grid_valid() {
            f.grid()?.to_vec()
        } else {
            self.domain.backward(f.coefficients()?, self.scale)?
        };
        self.cache.insert(name.to_string(), grid.clone());
        Ok(grid)
    }
}
