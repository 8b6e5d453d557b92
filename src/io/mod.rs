//! Snapshot and diagnostics output.
//!
//! This module provides:
//! - **Containers**: CBOR sequence files holding a header and one record per write
//! - **File handlers**: named task lists written on an iteration or sim-time cadence
//! - **Evaluator**: schedules the handlers of a run and performs the collective writes
//!
//! # File Format
//!
//! Handler `name` writes `<dir>/<name>_s<k>.cbor`, `k = 1, 2, ...`, starting a
//! new set after `max_writes` records:
//!
//! ```text
//! header  {handler, set_number, axes: [{name, grid}], tasks: [name]}
//! record  {write_number, iteration, sim_time, wall_time, tasks: [{name, shape, data}]}
//! record  ...
//! ```
//!
//! Grid tasks hold the global unit-scale grid in row-major order; scalar
//! tasks have an empty shape. Only rank 0 touches the filesystem.

mod container;
mod handler;

pub use container::{
    AxisCoordinates, Container, ContainerHeader, ContainerWriter, Record, TaskData,
    container_path, list_containers,
};
pub use handler::{Cadence, Evaluator, FileHandler};

use thiserror::Error;

/// Error type for snapshot storage.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CBOR encoding failed
    #[error("Encode error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    /// CBOR decoding failed
    #[error("Decode error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),

    /// Unexpected container contents or settings
    #[error("Format error: {0}")]
    Format(String),
}
