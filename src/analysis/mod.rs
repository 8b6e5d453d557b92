//! Post-processing of horizontal convection output.
//!
//! This module provides tools for:
//! - Recovering the streamfunction of a time-averaged 2D flow
//! - Normalizing the buoyancy dissipation into a Nusselt number
//! - Comparing grid data against a reference
//!
//! # Example
//!
//! ```ignore
//! use hc_rs::analysis::{mean_nusselt, recover_streamfunction};
//! use hc_rs::io::list_containers;
//!
//! let snapshots = list_containers("out", "snapshots")?;
//! let psi = recover_streamfunction(&domain, &snapshots, "out")?;
//!
//! let diagnostics = list_containers("out", "diagnostics")?;
//! let nu = mean_nusselt(&diagnostics, 1000.0, problem.diffusivity(), 2.0, 1.0)?;
//! ```

mod metrics;
mod nusselt;
mod streamfunction;

pub use metrics::ComparisonMetrics;
pub use nusselt::{diffusive_dissipation, mean_nusselt, nusselt, scalar_series, time_mean};
pub use streamfunction::{
    field_from_global, mean_over_axis, recover_streamfunction, remove_mean, solve_streamfunction,
    task_shape, time_average, velocities_from_streamfunction, velocity_mismatch,
};
