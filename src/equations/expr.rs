//! Operator trees for equations, boundary conditions and output tasks.
//!
//! Expressions are built with the free functions in this module and the
//! usual arithmetic operators:
//!
//! ```
//! use hc_rs::equations::{diff, dt, field, param};
//!
//! let lhs = dt(field("b")) - param("P") * (diff("x", diff("x", field("b"))) + diff("z", field("bz")));
//! let rhs = -(field("u") * diff("x", field("b")) + field("w") * field("bz"));
//! assert_eq!(lhs.to_string(), "(dt(b) - (P * (dx(dx(b)) + dz(bz))))");
//! assert!(rhs.contains_field("bz"));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Pointwise functions available in grid-space expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Sqrt,
    Abs,
}

impl Func {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Sqrt => x.sqrt(),
            Func::Abs => x.abs(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
        }
    }
}

/// A node of an equation operator tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Reference to a field by name (unknown or parameter field).
    Field(String),
    Const(f64),
    /// Named scalar parameter.
    Param(String),
    /// Coordinate of the named axis.
    Coord(String),
    Add(Box<Expr>, Box<Expr>),
    /// Difference, kept apart from `Add(a, Neg(b))` only for display.
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    /// Spatial derivative along the named axis.
    Diff { axis: String, arg: Box<Expr> },
    TimeDeriv(Box<Expr>),
    Apply { func: Func, arg: Box<Expr> },
    /// Integral over the whole domain; evaluates to a scalar.
    Integrate(Box<Expr>),
    /// Integral along one axis, constant along that axis.
    IntegrateAxis { axis: String, arg: Box<Expr> },
}

pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

pub fn constant(value: f64) -> Expr {
    Expr::Const(value)
}

pub fn param(name: impl Into<String>) -> Expr {
    Expr::Param(name.into())
}

pub fn coord(axis: impl Into<String>) -> Expr {
    Expr::Coord(axis.into())
}

pub fn diff(axis: impl Into<String>, arg: Expr) -> Expr {
    Expr::Diff {
        axis: axis.into(),
        arg: Box::new(arg),
    }
}

pub fn dt(arg: Expr) -> Expr {
    Expr::TimeDeriv(Box::new(arg))
}

pub fn integrate(arg: Expr) -> Expr {
    Expr::Integrate(Box::new(arg))
}

pub fn integrate_axis(axis: impl Into<String>, arg: Expr) -> Expr {
    Expr::IntegrateAxis {
        axis: axis.into(),
        arg: Box::new(arg),
    }
}

pub fn sin(arg: Expr) -> Expr {
    apply(Func::Sin, arg)
}

pub fn cos(arg: Expr) -> Expr {
    apply(Func::Cos, arg)
}

pub fn sqrt(arg: Expr) -> Expr {
    apply(Func::Sqrt, arg)
}

pub fn abs(arg: Expr) -> Expr {
    apply(Func::Abs, arg)
}

fn apply(func: Func, arg: Expr) -> Expr {
    Expr::Apply {
        func,
        arg: Box::new(arg),
    }
}

impl Expr {
    /// Child nodes, in order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Field(_) | Expr::Const(_) | Expr::Param(_) | Expr::Coord(_) => Vec::new(),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => vec![a, b],
            Expr::Neg(a)
            | Expr::TimeDeriv(a)
            | Expr::Integrate(a)
            | Expr::Diff { arg: a, .. }
            | Expr::IntegrateAxis { arg: a, .. }
            | Expr::Apply { arg: a, .. } => vec![a],
        }
    }

    fn any(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.any(pred))
    }

    pub fn contains_time_derivative(&self) -> bool {
        self.any(&|e| matches!(e, Expr::TimeDeriv(_)))
    }

    pub fn contains_integral(&self) -> bool {
        self.any(&|e| matches!(e, Expr::Integrate(_)))
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.any(&|e| matches!(e, Expr::Field(n) if n == name))
    }

    /// Exactly the literal zero.
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(c) if *c == 0.0)
    }

    /// Names of every field, parameter and coordinate referenced.
    pub fn symbols(&self) -> Symbols {
        let mut out = Symbols::default();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Symbols) {
        match self {
            Expr::Field(n) => {
                out.fields.insert(n.clone());
            }
            Expr::Param(n) => {
                out.params.insert(n.clone());
            }
            Expr::Coord(n) => {
                out.axes.insert(n.clone());
            }
            Expr::Diff { axis, .. } | Expr::IntegrateAxis { axis, .. } => {
                out.axes.insert(axis.clone());
            }
            _ => {}
        }
        for c in self.children() {
            c.collect(out);
        }
    }
}

/// Names referenced by an expression.
#[derive(Clone, Debug, Default)]
pub struct Symbols {
    pub fields: BTreeSet<String>,
    pub params: BTreeSet<String>,
    pub axes: BTreeSet<String>,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Field(n) | Expr::Param(n) | Expr::Coord(n) => write!(f, "{}", n),
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "({} * {})", a, b),
            Expr::Neg(a) => write!(f, "-{}", a),
            Expr::Diff { axis, arg } => write!(f, "d{}({})", axis, arg),
            Expr::TimeDeriv(a) => write!(f, "dt({})", a),
            Expr::Apply { func, arg } => write!(f, "{}({})", func.name(), arg),
            Expr::Integrate(a) => write!(f, "integ({})", a),
            Expr::IntegrateAxis { axis, arg } => write!(f, "integ({}, '{}')", arg, axis),
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl Add<f64> for Expr {
    type Output = Expr;
    fn add(self, rhs: f64) -> Expr {
        self + Expr::Const(rhs)
    }
}

impl Sub<f64> for Expr {
    type Output = Expr;
    fn sub(self, rhs: f64) -> Expr {
        self - Expr::Const(rhs)
    }
}

impl Mul<f64> for Expr {
    type Output = Expr;
    fn mul(self, rhs: f64) -> Expr {
        self * Expr::Const(rhs)
    }
}

impl Div<f64> for Expr {
    type Output = Expr;
    fn div(self, rhs: f64) -> Expr {
        self * Expr::Const(1.0 / rhs)
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Const(self) * rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols() {
        let e = param("R") * diff("x", field("u")) + cos(2.0 * coord("x"));
        let s = e.symbols();
        assert!(s.fields.contains("u"));
        assert!(s.params.contains("R"));
        assert!(s.axes.contains("x"));
        assert!(!e.contains_time_derivative());
    }

    #[test]
    fn test_display() {
        let e = integrate(constant(0.5) * (field("u") * field("u"))) / 4.0;
        assert_eq!(e.to_string(), "(integ((0.5 * (u * u))) * 0.25)");
        assert!(e.contains_integral());

        let avg = integrate_axis("y", field("bz"));
        assert_eq!(avg.to_string(), "integ(bz, 'y')");
        assert!(!avg.contains_integral());
        assert!(avg.symbols().axes.contains("y"));
    }
}
