//! Error taxonomy for problem assembly and integration.
//!
//! Every variant is fatal for the run that raised it. Nothing in the
//! numerical core retries; callers decide whether to persist partial
//! output before exiting.

use thiserror::Error;

use crate::io::SnapshotError;

/// Errors raised by domain construction, problem assembly and time stepping.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Bad resolution, interval, axis arrangement or worker decomposition.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The equation set violates the first-order, linear-implicit contract.
    #[error("Malformed system: {0}")]
    MalformedSystem(String),

    /// Boundary conditions do not cover every tau row exactly once.
    #[error("Ill-posed system: {0}")]
    IllPosedSystem(String),

    /// A representation was read while it was out of date.
    #[error("Stale state: {0}")]
    StaleState(String),

    /// Non-finite values appeared during a solve.
    #[error("Divergence at iteration {iteration}, sim time {sim_time:.6e}, stage {stage}: {detail}")]
    Divergence {
        iteration: u64,
        sim_time: f64,
        stage: usize,
        detail: String,
    },

    /// A peer worker vanished or sent an unexpected message.
    #[error("Communication error: {0}")]
    Communication(String),

    /// Snapshot or diagnostics storage failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl SolverError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a malformed-system error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSystem(msg.into())
    }

    /// Create an ill-posed-system error.
    pub fn ill_posed(msg: impl Into<String>) -> Self {
        Self::IllPosedSystem(msg.into())
    }

    /// Create a stale-state error.
    pub fn stale(msg: impl Into<String>) -> Self {
        Self::StaleState(msg.into())
    }

    /// Create a communication error.
    pub fn communication(msg: impl Into<String>) -> Self {
        Self::Communication(msg.into())
    }

    /// Whether this error is a numerical blow-up.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::Divergence { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;
