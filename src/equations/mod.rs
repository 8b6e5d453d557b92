//! Symbolic equation systems.
//!
//! Equations are operator trees ([`Expr`]) split into an implicit part,
//! linear with constant coefficients and solved per spectral mode, and an
//! explicit right-hand side evaluated in grid space:
//!
//! M · dt(X) + L · X = F(X)
//!
//! Only first derivatives along the Chebyshev axis may appear implicitly;
//! higher derivatives go through declared auxiliary unknowns. Each equation
//! with a Chebyshev derivative gives up its last row to a boundary condition
//! (tau method), and every mode must receive exactly one boundary condition
//! per such equation.

mod assembly;
mod expr;
mod horizontal_convection;
mod linear;
mod problem;

pub use assembly::{ModeLayout, ModeSystem, SparseMatrix};
pub use expr::{
    Expr, Func, Symbols, abs, constant, coord, cos, diff, dt, field, integrate, integrate_axis,
    param, sin, sqrt,
};
pub use horizontal_convection::{HorizontalConvection, NoiseConfig, WallCondition};
pub use linear::LinearTerm;
pub use problem::{
    BoundaryCondition, CompiledBoundary, CompiledEquation, Equation, ModeCondition, Problem,
    ProblemBuilder, ProblemKind,
};
