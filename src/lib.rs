//! # hc-rs
//!
//! A spectral solver for horizontal convection: Boussinesq flow in a box
//! forced by a horizontally varying surface buoyancy.
//!
//! This crate provides the building blocks of a distributed spectral PDE
//! runtime:
//! - Fourier and Chebyshev bases with dense transform plans
//! - Slab-decomposed domains over in-process workers
//! - Fields with explicit grid/coefficient representations
//! - Symbolic first-order equation systems, assembled per spectral mode
//! - IMEX Runge-Kutta time stepping (RK443, RK222, RK111) with an adaptive CFL
//! - Boundary-value solves (streamfunction recovery)
//! - Scheduled snapshot and diagnostics output
//!
//! # Example
//!
//! ```ignore
//! use hc_rs::simulation::{RunConfig, Simulation};
//! use hc_rs::parallel::SerialCommunicator;
//! use std::sync::Arc;
//!
//! let config = RunConfig::default().with_rayleigh(1e6).with_resolution(64, 32);
//! let result = Simulation::new(config, Arc::new(SerialCommunicator::new()))?.run()?;
//! println!("reached t = {}", result.final_time);
//! ```

pub mod analysis;
pub mod basis;
pub mod domain;
pub mod equations;
pub mod error;
pub mod evaluate;
pub mod field;
pub mod io;
pub mod operators;
pub mod parallel;
pub mod polynomial;
pub mod simulation;
pub mod solver;
pub mod time;
pub mod types;

// Re-export main types for convenience
pub use basis::{Basis, ChebyshevBasis, FourierBasis};
pub use domain::Domain;
pub use equations::{
    Expr, HorizontalConvection, ModeCondition, Problem, ProblemBuilder, WallCondition,
};
pub use error::{Result, SolverError};
pub use field::Field;
pub use io::{Cadence, Evaluator, SnapshotError};
pub use parallel::{Communicator, SerialCommunicator, run_workers};
pub use simulation::{RunConfig, Simulation, SimulationResult};
pub use solver::{
    BoundaryValueSolver, Cfl, CflConfig, FlowProperties, InitialValueSolver, SolverStatus,
    StopConditions,
};
pub use time::StandardIntegrator;
pub use types::{GridScale, Side};
