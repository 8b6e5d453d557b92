use crate::error::Result;

/// Interface for a fixed group of workers exchanging `f64` payloads.
///
/// Implementors provide point-to-point `send`/`recv` and a per-worker
/// collective sequence number. The trait then provides the collectives the
/// solver needs. Every worker must call the same collectives in the same
/// order, which is what keeps the sequence numbers aligned across workers.
pub trait Communicator: Send + Sync {
    /// Rank of this worker within the group.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Send a payload to a peer. Must not block on a matching receive.
    fn send(&self, dest: usize, tag: u64, payload: Vec<f64>) -> Result<()>;

    /// Receive the payload sent by `source` with `tag`. Messages with other
    /// sources or tags that arrive first must be held back, not dropped.
    fn recv(&self, source: usize, tag: u64) -> Result<Vec<f64>>;

    /// Next collective sequence number for this worker.
    fn next_tag(&self) -> u64;

    /// Personalized exchange: `blocks[d]` goes to rank `d`; the result holds
    /// the block received from each rank.
    fn all_to_all(&self, mut blocks: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
        let rank = self.rank();
        let size = self.size();
        debug_assert_eq!(blocks.len(), size);
        let tag = self.next_tag();

        for (dest, block) in blocks.iter_mut().enumerate() {
            if dest != rank {
                self.send(dest, tag, std::mem::take(block))?;
            }
        }
        let own = std::mem::take(&mut blocks[rank]);
        let mut received = Vec::with_capacity(size);
        for source in 0..size {
            if source == rank {
                received.push(Vec::new());
            } else {
                received.push(self.recv(source, tag)?);
            }
        }
        received[rank] = own;
        Ok(received)
    }

    /// Every worker receives every worker's payload, in rank order.
    fn all_gather(&self, payload: Vec<f64>) -> Result<Vec<Vec<f64>>> {
        let blocks = vec![payload; self.size()];
        self.all_to_all(blocks)
    }

    /// Sum of one value per worker, identical on every worker.
    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        if self.size() == 1 {
            return Ok(value);
        }
        Ok(self.all_gather(vec![value])?.iter().map(|v| v[0]).sum())
    }

    /// Maximum of one value per worker. NaN wins, so a blown-up worker is
    /// never hidden by a healthy one.
    fn all_reduce_max(&self, value: f64) -> Result<f64> {
        if self.size() == 1 {
            return Ok(value);
        }
        Ok(self
            .all_gather(vec![value])?
            .iter()
            .map(|v| v[0])
            .fold(f64::NEG_INFINITY, |acc, v| {
                if acc.is_nan() || v.is_nan() {
                    f64::NAN
                } else {
                    acc.max(v)
                }
            }))
    }

    /// Minimum of one value per worker, with the same NaN rule as
    /// [`Communicator::all_reduce_max`].
    fn all_reduce_min(&self, value: f64) -> Result<f64> {
        Ok(-self.all_reduce_max(-value)?)
    }

    /// Logical AND across workers.
    fn all_agree(&self, flag: bool) -> Result<bool> {
        let failures = self.all_reduce_sum(if flag { 0.0 } else { 1.0 })?;
        Ok(failures == 0.0)
    }

    /// Collect one payload per worker on `root`. Other ranks get `None`.
    fn gather(&self, payload: Vec<f64>, root: usize) -> Result<Option<Vec<Vec<f64>>>> {
        let rank = self.rank();
        let tag = self.next_tag();
        if rank != root {
            self.send(root, tag, payload)?;
            return Ok(None);
        }
        let mut received = Vec::with_capacity(self.size());
        let mut own = Some(payload);
        for source in 0..self.size() {
            if source == rank {
                received.push(own.take().unwrap_or_default());
            } else {
                received.push(self.recv(source, tag)?);
            }
        }
        Ok(Some(received))
    }
}
