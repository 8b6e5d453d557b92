use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SolverError};

use super::Communicator;

/// Single-worker group. Collectives reduce to identities.
#[derive(Debug, Default)]
pub struct SerialCommunicator {
    tags: AtomicU64,
}

impl SerialCommunicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _tag: u64, _payload: Vec<f64>) -> Result<()> {
        Err(SolverError::communication(format!(
            "serial communicator cannot send to rank {}",
            dest
        )))
    }

    fn recv(&self, source: usize, _tag: u64) -> Result<Vec<f64>> {
        Err(SolverError::communication(format!(
            "serial communicator cannot receive from rank {}",
            source
        )))
    }

    fn next_tag(&self) -> u64 {
        self.tags.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_collectives() {
        let comm = SerialCommunicator::new();
        assert_eq!(comm.all_reduce_sum(2.5).unwrap(), 2.5);
        assert_eq!(comm.all_reduce_max(-1.0).unwrap(), -1.0);
        let gathered = comm.gather(vec![1.0, 2.0], 0).unwrap().unwrap();
        assert_eq!(gathered, vec![vec![1.0, 2.0]]);
        let exchanged = comm.all_to_all(vec![vec![3.0]]).unwrap();
        assert_eq!(exchanged, vec![vec![3.0]]);
    }
}
