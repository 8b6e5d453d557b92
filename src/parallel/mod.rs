//! Message passing between cooperating workers.
//!
//! Workers run in lockstep (SPMD). The only data exchange in the hot loop is
//! the global transpose, an all-to-all collective; reductions and gathers
//! serve the CFL controller, divergence checks and snapshot output.
//!
//! - [`Communicator`]: point-to-point interface plus default collectives
//! - [`SerialCommunicator`]: one worker, no messages
//! - [`ThreadCommunicator`]: in-process workers over crossbeam channels
//! - [`run_workers`]: launch N workers on scoped threads

mod communicator;
mod serial;
mod thread;

pub use communicator::Communicator;
pub use serial::SerialCommunicator;
pub use thread::{ThreadCommunicator, run_workers};
