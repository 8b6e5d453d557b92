//! Slab decomposition and global transposes.
//!
//! Local arrays are viewed as three axes `[a, b, c]`: `a` is the first
//! (periodic) axis, `b` the product of any middle axes, and `c` the last
//! (Chebyshev) axis. In coefficient layout `a` is split over workers and `c`
//! is whole; in grid layout `a` is whole and `c` is split.

use std::sync::Arc;

use crate::error::{Result, SolverError};
use crate::parallel::Communicator;

/// Worker group plus the 1-D process mesh laid over it.
#[derive(Clone)]
pub struct Distributor {
    comm: Arc<dyn Communicator>,
    mesh: Vec<usize>,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("rank", &self.comm.rank())
            .field("mesh", &self.mesh)
            .finish()
    }
}

impl Distributor {
    /// Lay a process mesh over the group.
    ///
    /// An empty mesh means one dimension spanning all workers. Meshes with
    /// more than one non-trivial dimension are not supported.
    pub fn new(comm: Arc<dyn Communicator>, mesh: &[usize]) -> Result<Self> {
        let size = comm.size();
        let mesh: Vec<usize> = if mesh.is_empty() {
            vec![size]
        } else {
            mesh.to_vec()
        };
        if mesh.iter().product::<usize>() != size {
            return Err(SolverError::configuration(format!(
                "process mesh {:?} does not match {} workers",
                mesh, size
            )));
        }
        if mesh.iter().filter(|&&m| m > 1).count() > 1 {
            return Err(SolverError::configuration(format!(
                "process mesh {:?} has more than one dimension; only slab decompositions are supported",
                mesh
            )));
        }
        Ok(Self {
            comm,
            mesh: vec![size],
        })
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn mesh(&self) -> &[usize] {
        &self.mesh
    }

    /// `[a_loc, b, c]` with `c` whole → `[a_loc * P, b, c / P]`.
    pub fn transpose_to_grid_layout(
        &self,
        data: &[f64],
        a_loc: usize,
        b: usize,
        c: usize,
    ) -> Result<Vec<f64>> {
        let p = self.size();
        if p == 1 {
            return Ok(data.to_vec());
        }
        let c_loc = c / p;
        let blocks: Vec<Vec<f64>> = (0..p)
            .map(|d| {
                let mut block = Vec::with_capacity(a_loc * b * c_loc);
                for ia in 0..a_loc {
                    for ib in 0..b {
                        let start = (ia * b + ib) * c + d * c_loc;
                        block.extend_from_slice(&data[start..start + c_loc]);
                    }
                }
                block
            })
            .collect();

        let received = self.comm.all_to_all(blocks)?;
        let mut out = vec![0.0; a_loc * p * b * c_loc];
        for (s, block) in received.iter().enumerate() {
            check_block(block, a_loc * b * c_loc, s)?;
            for ia in 0..a_loc {
                for ib in 0..b {
                    let src = (ia * b + ib) * c_loc;
                    let dst = ((s * a_loc + ia) * b + ib) * c_loc;
                    out[dst..dst + c_loc].copy_from_slice(&block[src..src + c_loc]);
                }
            }
        }
        Ok(out)
    }

    /// `[a, b, c_loc]` with `a` whole → `[a / P, b, c_loc * P]`.
    pub fn transpose_to_coeff_layout(
        &self,
        data: &[f64],
        a: usize,
        b: usize,
        c_loc: usize,
    ) -> Result<Vec<f64>> {
        let p = self.size();
        if p == 1 {
            return Ok(data.to_vec());
        }
        let a_loc = a / p;
        let c = c_loc * p;
        let blocks: Vec<Vec<f64>> = (0..p)
            .map(|d| {
                let start = d * a_loc * b * c_loc;
                data[start..start + a_loc * b * c_loc].to_vec()
            })
            .collect();

        let received = self.comm.all_to_all(blocks)?;
        let mut out = vec![0.0; a_loc * b * c];
        for (s, block) in received.iter().enumerate() {
            check_block(block, a_loc * b * c_loc, s)?;
            for ia in 0..a_loc {
                for ib in 0..b {
                    let src = (ia * b + ib) * c_loc;
                    let dst = (ia * b + ib) * c + s * c_loc;
                    out[dst..dst + c_loc].copy_from_slice(&block[src..src + c_loc]);
                }
            }
        }
        Ok(out)
    }
}

fn check_block(block: &[f64], expected: usize, source: usize) -> Result<()> {
    if block.len() != expected {
        return Err(SolverError::communication(format!(
            "transpose block from rank {} has {} values (expected {})",
            source,
            block.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::run_workers;

    #[test]
    fn test_rejects_two_dimensional_mesh() {
        let results = run_workers(4, |comm| Distributor::new(comm, &[2, 2]).is_err()).unwrap();
        assert!(results.iter().all(|&rejected| rejected));
    }

    #[test]
    fn test_transpose_roundtrip() {
        // Global [a=4, b=2, c=6] split over 2 workers.
        let results = run_workers(2, |comm| {
            let dist = Distributor::new(comm, &[]).unwrap();
            let r = dist.rank();
            let local: Vec<f64> = (0..2 * 2 * 6)
                .map(|i| {
                    let ia = r * 2 + i / 12;
                    let rest = i % 12;
                    (ia * 12 + rest) as f64
                })
                .collect();
            let grid = dist.transpose_to_grid_layout(&local, 2, 2, 6).unwrap();
            let back = dist.transpose_to_coeff_layout(&grid, 4, 2, 3).unwrap();
            (local, grid, back)
        })
        .unwrap();

        for (rank, (local, grid, back)) in results.iter().enumerate() {
            assert_eq!(local, back);
            // Grid layout holds every a, and c in this rank's block.
            for ia in 0..4 {
                for ib in 0..2 {
                    for ic in 0..3 {
                        let global = (ia * 2 + ib) * 6 + rank * 3 + ic;
                        assert_eq!(grid[(ia * 2 + ib) * 3 + ic], global as f64);
                    }
                }
            }
        }
    }
}
