//! Distributed tensor-product domain.
//!
//! A domain is an ordered list of bases, one or two periodic axes followed by
//! one Chebyshev axis, plus a [`Distributor`] that splits the data over
//! workers:
//!
//! | layout      | local shape                    | split axis |
//! |-------------|--------------------------------|------------|
//! | coefficient | `[2 Mx / P, (Ny), Nz]`         | x modes    |
//! | grid        | `[Gx, (Gy), Gz / P]`           | z points   |
//!
//! Backward transforms run z → transpose → (y) → x; forward transforms run the
//! same steps in reverse. The transpose is the only communication.

mod distributor;

pub use distributor::Distributor;

use std::sync::Arc;

use log::debug;

use crate::basis::{Basis, apply_along_axis};
use crate::error::{Result, SolverError};
use crate::parallel::Communicator;
use crate::polynomial::chebyshev_integral;
use crate::types::GridScale;

/// Ordered bases plus their distribution over workers.
#[derive(Debug)]
pub struct Domain {
    bases: Vec<Basis>,
    distributor: Distributor,
}

impl Domain {
    /// Build a domain decomposed over every worker in `comm`.
    pub fn new(bases: Vec<Basis>, comm: Arc<dyn Communicator>) -> Result<Self> {
        Self::with_mesh(bases, comm, &[])
    }

    /// Build a domain with an explicit process mesh.
    pub fn with_mesh(
        bases: Vec<Basis>,
        comm: Arc<dyn Communicator>,
        mesh: &[usize],
    ) -> Result<Self> {
        if !(2..=3).contains(&bases.len()) {
            return Err(SolverError::configuration(format!(
                "domains need 2 or 3 axes (got {})",
                bases.len()
            )));
        }
        let (last, periodic) = bases.split_last().ok_or_else(|| {
            SolverError::configuration("domain has no axes")
        })?;
        if last.is_periodic() || periodic.iter().any(|b| !b.is_periodic()) {
            return Err(SolverError::configuration(
                "the Chebyshev axis must be last and every other axis periodic",
            ));
        }
        for (i, b) in bases.iter().enumerate() {
            if bases[..i].iter().any(|o| o.name() == b.name()) {
                return Err(SolverError::configuration(format!(
                    "duplicate axis name '{}'",
                    b.name()
                )));
            }
        }

        let distributor = Distributor::new(comm, mesh)?;
        let p = distributor.size();
        let x_modes = bases[0].size() / 2;
        if x_modes % p != 0 {
            return Err(SolverError::configuration(format!(
                "{} workers do not divide the {} modes of axis '{}'",
                p,
                x_modes,
                bases[0].name()
            )));
        }
        for scale in [GridScale::Unit, GridScale::Dealias] {
            let gz = last.grid_size(scale);
            if gz % p != 0 {
                return Err(SolverError::configuration(format!(
                    "{} workers do not divide the {} grid points of axis '{}' ({:?} scale)",
                    p,
                    gz,
                    last.name(),
                    scale
                )));
            }
        }

        debug!(
            "rank {}: domain {:?} over {} workers",
            distributor.rank(),
            bases.iter().map(|b| (b.name(), b.size())).collect::<Vec<_>>(),
            p
        );
        Ok(Self { bases, distributor })
    }

    pub fn dim(&self) -> usize {
        self.bases.len()
    }

    pub fn bases(&self) -> &[Basis] {
        &self.bases
    }

    pub fn basis(&self, axis: usize) -> &Basis {
        &self.bases[axis]
    }

    /// Axis number of the basis called `name`.
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.bases.iter().position(|b| b.name() == name)
    }

    /// Index of the Chebyshev axis (always the last one).
    pub fn z_axis(&self) -> usize {
        self.bases.len() - 1
    }

    /// Number of periodic axes.
    pub fn n_periodic(&self) -> usize {
        self.bases.len() - 1
    }

    /// cos/sin components per periodic mode tuple, 2^(periodic axes).
    pub fn n_components(&self) -> usize {
        1 << self.n_periodic()
    }

    pub fn nz(&self) -> usize {
        self.bases[self.z_axis()].size()
    }

    pub fn distributor(&self) -> &Distributor {
        &self.distributor
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        self.distributor.comm()
    }

    /// Number of x modes held locally in coefficient layout.
    pub fn local_x_modes(&self) -> usize {
        self.bases[0].size() / 2 / self.distributor.size()
    }

    /// Global index of the first local x mode.
    pub fn x_mode_offset(&self) -> usize {
        self.distributor.rank() * self.local_x_modes()
    }

    /// Product of the middle (y) coefficient sizes, 1 in two dimensions.
    fn middle_coeffs(&self) -> usize {
        self.bases[1..self.z_axis()].iter().map(|b| b.size()).product()
    }

    fn middle_grid(&self, scale: GridScale) -> usize {
        self.bases[1..self.z_axis()]
            .iter()
            .map(|b| b.grid_size(scale))
            .product()
    }

    /// Local coefficient-layout shape.
    pub fn coeff_shape(&self) -> Vec<usize> {
        let mut shape = vec![2 * self.local_x_modes()];
        shape.extend(self.bases[1..].iter().map(|b| b.size()));
        shape
    }

    pub fn coeff_len(&self) -> usize {
        self.coeff_shape().iter().product()
    }

    /// Local grid-layout shape at `scale`.
    pub fn grid_shape(&self, scale: GridScale) -> Vec<usize> {
        let mut shape: Vec<usize> = self.bases.iter().map(|b| b.grid_size(scale)).collect();
        let z = self.z_axis();
        shape[z] /= self.distributor.size();
        shape
    }

    pub fn grid_len(&self, scale: GridScale) -> usize {
        self.grid_shape(scale).iter().product()
    }

    /// Global grid shape at `scale`.
    pub fn global_grid_shape(&self, scale: GridScale) -> Vec<usize> {
        self.bases.iter().map(|b| b.grid_size(scale)).collect()
    }

    /// Full grid of one axis.
    pub fn global_grid(&self, axis: usize, scale: GridScale) -> Vec<f64> {
        self.bases[axis].grid(scale)
    }

    /// Grid points of one axis held by this worker in grid layout.
    pub fn local_grid(&self, axis: usize, scale: GridScale) -> Vec<f64> {
        self.local_slice(axis, self.bases[axis].grid(scale))
    }

    /// Grid spacing of one axis at the points held by this worker.
    pub fn local_grid_spacing(&self, axis: usize, scale: GridScale) -> Vec<f64> {
        self.local_slice(axis, self.bases[axis].grid_spacing(scale))
    }

    fn local_slice(&self, axis: usize, full: Vec<f64>) -> Vec<f64> {
        if axis != self.z_axis() {
            return full;
        }
        let n = full.len() / self.distributor.size();
        let start = self.distributor.rank() * n;
        full[start..start + n].to_vec()
    }

    /// Coordinate of `axis` at every local grid point, flattened row-major.
    pub fn local_coordinate(&self, axis: usize, scale: GridScale) -> Vec<f64> {
        let values = self.local_grid(axis, scale);
        self.broadcast_axis(&values, axis, scale)
    }

    /// Spacing of `axis` at every local grid point, flattened row-major.
    pub fn local_spacing_field(&self, axis: usize, scale: GridScale) -> Vec<f64> {
        let values = self.local_grid_spacing(axis, scale);
        self.broadcast_axis(&values, axis, scale)
    }

    fn broadcast_axis(&self, values: &[f64], axis: usize, scale: GridScale) -> Vec<f64> {
        let shape = self.grid_shape(scale);
        let inner: usize = shape[axis + 1..].iter().product();
        let n = shape[axis];
        (0..shape.iter().product::<usize>())
            .map(|i| values[(i / inner) % n])
            .collect()
    }

    /// Global mode number of coefficient slot `slot` along periodic `axis`.
    ///
    /// For the first axis `slot` is local; other axes are never split.
    pub fn global_mode(&self, axis: usize, slot: usize) -> usize {
        if axis == 0 {
            self.x_mode_offset() + slot / 2
        } else {
            slot / 2
        }
    }

    /// Wavenumber of global mode `mode` along periodic `axis`.
    pub fn wavenumber(&self, axis: usize, mode: usize) -> f64 {
        match &self.bases[axis] {
            Basis::Fourier(b) => b.wavenumber(mode),
            Basis::Chebyshev(_) => 0.0,
        }
    }

    /// Local periodic mode tuples in coefficient-layout order.
    ///
    /// Entry `[mx, (my)]` holds the local x mode and the global y mode.
    pub fn local_mode_tuples(&self) -> Vec<Vec<usize>> {
        let mut tuples = vec![Vec::new()];
        let mut sizes = vec![self.local_x_modes()];
        sizes.extend(self.bases[1..self.z_axis()].iter().map(|b| b.size() / 2));
        for n in sizes {
            tuples = tuples
                .into_iter()
                .flat_map(|t| {
                    (0..n).map(move |m| {
                        let mut next = t.clone();
                        next.push(m);
                        next
                    })
                })
                .collect();
        }
        tuples
    }

    /// Global mode numbers of a local mode tuple.
    pub fn global_modes(&self, local: &[usize]) -> Vec<usize> {
        local
            .iter()
            .enumerate()
            .map(|(axis, &m)| if axis == 0 { m + self.x_mode_offset() } else { m })
            .collect()
    }

    /// Offset of the Nz-long Chebyshev pencil for a local mode tuple and
    /// component in the coefficient layout.
    ///
    /// Component bits run from the first periodic axis (most significant) to
    /// the last; bit 0 selects cos, bit 1 sin.
    pub fn pencil_offset(&self, local: &[usize], comp: usize) -> usize {
        let shape = self.coeff_shape();
        let p = self.n_periodic();
        let mut flat = 0;
        for (axis, &m) in local.iter().enumerate() {
            let bit = (comp >> (p - 1 - axis)) & 1;
            flat = flat * shape[axis] + 2 * m + bit;
        }
        flat * self.nz()
    }

    /// Coefficient → grid transform at `scale` (collective).
    pub fn backward(&self, coeffs: &[f64], scale: GridScale) -> Result<Vec<f64>> {
        self.check_len(coeffs.len(), self.coeff_len(), "coefficient")?;
        let z = self.z_axis();
        let mut shape = self.coeff_shape();

        let mut data = self.bases[z]
            .plan(scale)
            .backward_along(coeffs, &shape, z);
        shape[z] = self.bases[z].grid_size(scale);

        let a_loc = shape[0];
        let b = self.middle_coeffs();
        data = self
            .distributor
            .transpose_to_grid_layout(&data, a_loc, b, shape[z])?;
        shape[0] = self.bases[0].size();
        shape[z] /= self.distributor.size();

        for axis in (0..z).rev() {
            data = self.bases[axis].plan(scale).backward_along(&data, &shape, axis);
            shape[axis] = self.bases[axis].grid_size(scale);
        }
        Ok(data)
    }

    /// Grid → coefficient transform at `scale` (collective).
    pub fn forward(&self, values: &[f64], scale: GridScale) -> Result<Vec<f64>> {
        self.check_len(values.len(), self.grid_len(scale), "grid")?;
        let z = self.z_axis();
        let mut shape = self.grid_shape(scale);

        let mut data = values.to_vec();
        for axis in 0..z {
            data = self.bases[axis].plan(scale).forward_along(&data, &shape, axis);
            shape[axis] = self.bases[axis].size();
        }

        let b = self.middle_coeffs();
        data = self
            .distributor
            .transpose_to_coeff_layout(&data, shape[0], b, shape[z])?;
        shape[0] /= self.distributor.size();
        shape[z] *= self.distributor.size();

        Ok(self.bases[z].plan(scale).forward_along(&data, &shape, z))
    }

    fn check_len(&self, got: usize, expected: usize, what: &str) -> Result<()> {
        if got != expected {
            return Err(SolverError::configuration(format!(
                "{} data has {} values, local layout needs {}",
                what, got, expected
            )));
        }
        Ok(())
    }

    /// Product of all axis lengths.
    pub fn volume(&self) -> f64 {
        self.bases.iter().map(|b| b.length()).product()
    }

    /// Volume integral of a coefficient-layout array (collective).
    ///
    /// Only the mean (mode 0, cos) pencil contributes; it lives on rank 0.
    pub fn integrate_coefficients(&self, coeffs: &[f64]) -> Result<f64> {
        let mut local = 0.0;
        if self.x_mode_offset() == 0 {
            let zero = vec![0; self.n_periodic()];
            let offset = self.pencil_offset(&zero, 0);
            let lz = self.bases[self.z_axis()].length();
            let periodic: f64 = self.bases[..self.z_axis()].iter().map(|b| b.length()).product();
            local = coeffs[offset..offset + self.nz()]
                .iter()
                .enumerate()
                .map(|(n, c)| c * chebyshev_integral(n))
                .sum::<f64>()
                * 0.5
                * lz
                * periodic;
        }
        self.comm().all_reduce_sum(local)
    }

    /// Integral along a periodic axis of local grid values, broadcast back
    /// along that axis. Local only: periodic axes are whole in grid layout.
    pub fn integrate_axis_grid(
        &self,
        values: &[f64],
        axis: usize,
        scale: GridScale,
    ) -> Result<Vec<f64>> {
        if axis >= self.z_axis() {
            return Err(SolverError::malformed(format!(
                "integration along '{}' is only supported for periodic axes",
                self.bases[axis.min(self.z_axis())].name()
            )));
        }
        let shape = self.grid_shape(scale);
        self.check_len(values.len(), shape.iter().product(), "grid")?;
        let n = shape[axis];
        let inner: usize = shape[axis + 1..].iter().product();
        let weight = self.bases[axis].length() / n as f64;
        let mut out = vec![0.0; values.len()];
        for (src, dst) in values.chunks(n * inner).zip(out.chunks_mut(n * inner)) {
            for i in 0..inner {
                let total: f64 = (0..n).map(|k| src[k * inner + i]).sum::<f64>() * weight;
                for k in 0..n {
                    dst[k * inner + i] = total;
                }
            }
        }
        Ok(out)
    }

    /// Assemble the global grid array on rank 0 (collective).
    pub fn gather_grid(&self, local: &[f64], scale: GridScale) -> Result<Option<Vec<f64>>> {
        let gathered = self.comm().gather(local.to_vec(), 0)?;
        let Some(blocks) = gathered else {
            return Ok(None);
        };
        let global = self.global_grid_shape(scale);
        let gz = global[self.z_axis()];
        let gz_loc = gz / self.distributor.size();
        let rows: usize = global[..self.z_axis()].iter().product();
        let mut out = vec![0.0; rows * gz];
        for (s, block) in blocks.iter().enumerate() {
            self.check_len(block.len(), rows * gz_loc, "gathered grid")?;
            for r in 0..rows {
                let dst = r * gz + s * gz_loc;
                out[dst..dst + gz_loc].copy_from_slice(&block[r * gz_loc..(r + 1) * gz_loc]);
            }
        }
        Ok(Some(out))
    }

    /// This worker's grid-layout block of a global grid array. Local only.
    pub fn local_block(&self, global: &[f64], scale: GridScale) -> Result<Vec<f64>> {
        let shape = self.global_grid_shape(scale);
        self.check_len(global.len(), shape.iter().product(), "global grid")?;
        let gz = shape[self.z_axis()];
        let gz_loc = gz / self.distributor.size();
        let start = self.distributor.rank() * gz_loc;
        Ok(global
            .chunks(gz)
            .flat_map(|row| row[start..start + gz_loc].iter().copied())
            .collect())
    }

    /// Shape of a boundary trace in coefficient layout: `[2 Mx / P, (Ny)]`.
    pub fn trace_shape(&self) -> Vec<usize> {
        let mut shape = self.coeff_shape();
        shape.pop();
        shape
    }

    /// Periodic-axes grid values of a boundary trace (collective).
    ///
    /// Every worker receives the full `[Gx, (Gy)]` array.
    pub fn trace_to_grid(&self, trace: &[f64], scale: GridScale) -> Result<Vec<f64>> {
        let blocks = self.comm().all_gather(trace.to_vec())?;
        let mut data: Vec<f64> = blocks.into_iter().flatten().collect();
        let mut shape = self.trace_shape();
        shape[0] = self.bases[0].size();
        self.check_len(data.len(), shape.iter().product(), "trace")?;
        for axis in (0..self.n_periodic()).rev() {
            data = self.bases[axis].plan(scale).backward_along(&data, &shape, axis);
            shape[axis] = self.bases[axis].grid_size(scale);
        }
        Ok(data)
    }

    /// Forward transform over the periodic axes of a full `[Gx, (Gy)]` array,
    /// returning this worker's `[2 Mx / P, (Ny)]` block. Local only.
    pub fn periodic_forward(&self, values: &[f64], scale: GridScale) -> Result<Vec<f64>> {
        let mut shape: Vec<usize> = self.bases[..self.z_axis()]
            .iter()
            .map(|b| b.grid_size(scale))
            .collect();
        self.check_len(values.len(), shape.iter().product(), "periodic grid")?;
        let mut data = values.to_vec();
        for axis in 0..self.n_periodic() {
            let plan = self.bases[axis].plan(scale);
            data = apply_along_axis(&data, &shape, axis, &plan.forward, plan.n_coeff);
            shape[axis] = self.bases[axis].size();
        }
        let block = data.len() / self.distributor.size();
        let start = self.distributor.rank() * block;
        Ok(data[start..start + block].to_vec())
    }
}
