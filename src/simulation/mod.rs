//! Horizontal convection runs.
//!
//! This module ties together:
//! - Run configuration ([`RunConfig`], serde/JSON)
//! - The adaptive CFL controller and the IMEX solver
//! - Flow-property logging and snapshot/diagnostics output
//!
//! # Example
//! ```ignore
//! use hc_rs::parallel::run_workers;
//! use hc_rs::simulation::{RunConfig, Simulation};
//!
//! let config = RunConfig::default().with_rayleigh(1e6).with_resolution(64, 32);
//! let results = run_workers(2, |comm| {
//!     Simulation::new(config.clone(), comm)?.run()
//! })?;
//! ```

mod config;
mod runner;

pub use config::{DomainConfig, OutputConfig, PhysicsConfig, RunConfig};
pub use runner::{Simulation, SimulationResult};
