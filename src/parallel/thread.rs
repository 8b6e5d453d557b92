use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::error::{Result, SolverError};

use super::Communicator;

/// Tag of the notice an endpoint sends its peers when it is dropped.
const EXIT_TAG: u64 = u64::MAX;

/// One message in flight between in-process workers.
#[derive(Debug)]
struct Envelope {
    source: usize,
    tag: u64,
    payload: Vec<f64>,
}

/// In-process worker endpoint connected to its peers by crossbeam channels.
///
/// Messages that arrive ahead of the receive that wants them (another source,
/// or a later collective) are parked in `pending` until asked for.
///
/// Every collective must be reached by all workers. A worker that leaves
/// early (error return or panic) drops its endpoint, which sends an exit
/// notice to each peer; a peer waiting on that worker then fails with a
/// communication error instead of blocking, and the failure cascades as the
/// remaining workers return.
pub struct ThreadCommunicator {
    rank: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    pending: Mutex<Vec<Envelope>>,
    departed: Mutex<Vec<bool>>,
    tags: AtomicU64,
}

impl ThreadCommunicator {
    /// Create a fully connected group of `size` endpoints.
    ///
    /// An endpoint holds no sender to itself: self-sends go straight to the
    /// pending buffer, so a worker whose peers have all exited sees a
    /// disconnected inbox instead of blocking forever.
    pub fn group(size: usize) -> Vec<ThreadCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadCommunicator {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(r, s)| if r == rank { None } else { Some(s.clone()) })
                    .collect(),
                inbox,
                pending: Mutex::new(Vec::new()),
                departed: Mutex::new(vec![false; size]),
                tags: AtomicU64::new(0),
            })
            .collect()
    }

    fn take_pending(&self, source: usize, tag: u64) -> Result<Option<Vec<f64>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| SolverError::communication("pending buffer poisoned"))?;
        Ok(pending
            .iter()
            .position(|e| e.source == source && e.tag == tag)
            .map(|i| pending.swap_remove(i).payload))
    }

    fn departed(&self, source: usize) -> Result<bool> {
        let departed = self
            .departed
            .lock()
            .map_err(|_| SolverError::communication("departure list poisoned"))?;
        Ok(departed.get(source).copied().unwrap_or(false))
    }

    fn mark_departed(&self, source: usize) -> Result<()> {
        debug!("rank {}: rank {} has exited", self.rank, source);
        let mut departed = self
            .departed
            .lock()
            .map_err(|_| SolverError::communication("departure list poisoned"))?;
        if let Some(d) = departed.get_mut(source) {
            *d = true;
        }
        Ok(())
    }

    fn exited_error(&self, source: usize, tag: u64) -> SolverError {
        SolverError::communication(format!(
            "rank {}: rank {} exited before sending tag {}",
            self.rank, source, tag
        ))
    }

    fn park(&self, envelope: Envelope) -> Result<()> {
        debug!(
            "rank {}: parking message from rank {} (tag {})",
            self.rank, envelope.source, envelope.tag
        );
        self.pending
            .lock()
            .map_err(|_| SolverError::communication("pending buffer poisoned"))?
            .push(envelope);
        Ok(())
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, dest: usize, tag: u64, payload: Vec<f64>) -> Result<()> {
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload,
        };
        if dest == self.rank {
            return self.park(envelope);
        }
        let sender = self
            .peers
            .get(dest)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| SolverError::communication(format!("no such rank {}", dest)))?;
        sender
            .send(envelope)
            .map_err(|_| SolverError::communication(format!("rank {} has exited", dest)))
    }

    fn recv(&self, source: usize, tag: u64) -> Result<Vec<f64>> {
        if let Some(payload) = self.take_pending(source, tag)? {
            return Ok(payload);
        }
        // Messages from one sender arrive in order, so nothing follows its
        // exit notice.
        if self.departed(source)? {
            return Err(self.exited_error(source, tag));
        }
        loop {
            let envelope = self.inbox.recv().map_err(|_| {
                SolverError::communication(format!(
                    "rank {}: all peers exited while waiting for rank {} (tag {})",
                    self.rank, source, tag
                ))
            })?;
            if envelope.tag == EXIT_TAG {
                self.mark_departed(envelope.source)?;
                if envelope.source == source {
                    return Err(self.exited_error(source, tag));
                }
                continue;
            }
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.park(envelope)?;
        }
    }

    fn next_tag(&self) -> u64 {
        self.tags.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for ThreadCommunicator {
    fn drop(&mut self) {
        for sender in self.peers.iter().flatten() {
            // A peer that already exited has nothing left to wake.
            let _ = sender.send(Envelope {
                source: self.rank,
                tag: EXIT_TAG,
                payload: Vec::new(),
            });
        }
    }
}

/// Run `f` on `n` in-process workers and collect their results in rank order.
///
/// Each worker owns one endpoint of a [`ThreadCommunicator`] group; with
/// `n == 1` the worker gets a [`super::SerialCommunicator`].
pub fn run_workers<T, F>(n: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(Arc<dyn Communicator>) -> T + Sync,
{
    if n == 0 {
        return Err(SolverError::configuration("need at least one worker"));
    }
    if n == 1 {
        return Ok(vec![f(Arc::new(super::SerialCommunicator::new()))]);
    }

    let endpoints = ThreadCommunicator::group(n);
    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|comm| {
                let comm: Arc<dyn Communicator> = Arc::new(comm);
                scope.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| {
                h.join()
                    .map_err(|_| SolverError::communication(format!("worker {} panicked", rank)))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_to_all_transposes_blocks() {
        let results = run_workers(3, |comm| {
            let r = comm.rank() as f64;
            let blocks = (0..3).map(|d| vec![10.0 * r + d as f64]).collect();
            comm.all_to_all(blocks).unwrap()
        })
        .unwrap();
        for (rank, received) in results.iter().enumerate() {
            for (source, block) in received.iter().enumerate() {
                assert_eq!(block[0], 10.0 * source as f64 + rank as f64);
            }
        }
    }

    #[test]
    fn test_reductions_agree() {
        let results = run_workers(4, |comm| {
            let r = comm.rank() as f64;
            (
                comm.all_reduce_sum(r).unwrap(),
                comm.all_reduce_max(r).unwrap(),
                comm.all_reduce_min(r).unwrap(),
            )
        })
        .unwrap();
        for (sum, max, min) in results {
            assert_eq!(sum, 6.0);
            assert_eq!(max, 3.0);
            assert_eq!(min, 0.0);
        }
    }

    #[test]
    fn test_out_of_order_messages_are_buffered() {
        let results = run_workers(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, 7, vec![7.0]).unwrap();
                comm.send(1, 3, vec![3.0]).unwrap();
                Vec::new()
            } else {
                let first = comm.recv(0, 3).unwrap();
                let second = comm.recv(0, 7).unwrap();
                vec![first[0], second[0]]
            }
        })
        .unwrap();
        assert_eq!(results[1], vec![3.0, 7.0]);
    }

    #[test]
    fn test_early_exit_fails_peers_instead_of_blocking() {
        let results = run_workers(3, |comm| {
            if comm.rank() == 2 {
                return None;
            }
            Some(comm.all_reduce_sum(1.0))
        })
        .unwrap();
        assert!(results[2].is_none());
        for r in &results[..2] {
            assert!(matches!(r, Some(Err(SolverError::Communication(_)))));
        }
    }

    #[test]
    fn test_nan_propagates_through_max() {
        let results = run_workers(2, |comm| {
            let v = if comm.rank() == 1 { f64::NAN } else { 1.0 };
            comm.all_reduce_max(v).unwrap()
        })
        .unwrap();
        assert!(results.iter().all(|v| v.is_nan()));
    }
}
