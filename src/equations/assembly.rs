//! Per-mode assembly of the implicit operators.
//!
//! For each local periodic mode tuple the unknown vector stacks, for every
//! variable and every cos/sin component, the Nz Chebyshev coefficients:
//!
//! index = var * (C * Nz) + comp * Nz + n,   C = 2^(periodic axes)
//!
//! Equation rows use the same layout with `var` replaced by the equation
//! number. Tau rows (last Chebyshev row of every equation with a z
//! derivative) are cleared in M and L and filled by boundary rows.

use faer::Mat;

use crate::domain::Domain;
use crate::error::{Result, SolverError};
use crate::operators::{boundary_row, chebyshev_derivative_matrix, fourier_rotation};

use super::linear::LinearTerm;
use super::problem::Problem;

/// Row-wise sparse matrix.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    n_cols: usize,
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrix {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_cols,
            rows: vec![Vec::new(); n_rows],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.rows[row].push((col, value));
        }
    }

    pub fn row(&self, row: usize) -> &[(usize, f64)] {
        &self.rows[row]
    }

    pub fn clear_row(&mut self, row: usize) {
        self.rows[row].clear();
    }

    pub fn set_row(&mut self, row: usize, entries: Vec<(usize, f64)>) {
        self.rows[row] = entries;
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|r| r.iter().map(|&(c, v)| v * x[c]).sum())
            .collect()
    }

    /// dense += factor * self
    pub fn add_to_dense(&self, factor: f64, dense: &mut Mat<f64>) {
        for (i, r) in self.rows.iter().enumerate() {
            for &(c, v) in r {
                dense[(i, c)] += factor * v;
            }
        }
    }

    /// Right-multiply by the Dirichlet recombination of the flagged pencils.
    fn recombined(&self, layout: &ModeLayout, dirichlet: &[bool]) -> SparseMatrix {
        let rows = self
            .rows
            .iter()
            .map(|r| layout.recombine_row(r, dirichlet))
            .collect();
        SparseMatrix {
            n_cols: self.n_cols,
            rows,
        }
    }
}

/// Index arithmetic of the per-mode unknown vector.
#[derive(Clone, Copy, Debug)]
pub struct ModeLayout {
    pub n_vars: usize,
    pub n_comps: usize,
    pub nz: usize,
}

impl ModeLayout {
    pub fn size(&self) -> usize {
        self.n_vars * self.n_comps * self.nz
    }

    pub fn index(&self, var: usize, comp: usize, n: usize) -> usize {
        (var * self.n_comps + comp) * self.nz + n
    }

    fn recombine_row(&self, row: &[(usize, f64)], dirichlet: &[bool]) -> Vec<(usize, f64)> {
        let mut out = Vec::with_capacity(row.len() * 2);
        for &(col, v) in row {
            out.push((col, v));
            let var = col / (self.n_comps * self.nz);
            let n = col % self.nz;
            if dirichlet[var] && n + 2 < self.nz {
                out.push((col + 2, -v));
            }
        }
        out
    }
}

/// Implicit operators of one periodic mode tuple.
#[derive(Clone, Debug)]
pub struct ModeSystem {
    /// Local mode tuple (x mode local, other modes global).
    pub local_modes: Vec<usize>,
    pub global_modes: Vec<usize>,
    pub layout: ModeLayout,
    /// Time-derivative operator, tau rows cleared.
    pub m: SparseMatrix,
    /// Linear operator, tau rows cleared.
    pub l: SparseMatrix,
    /// Boundary rows and their targets.
    pub bc_rows: Vec<usize>,
    pub bc_values: Vec<f64>,
    m_pre: SparseMatrix,
    l_pre: SparseMatrix,
    bc_pre: Vec<Vec<(usize, f64)>>,
    dirichlet: Vec<bool>,
}

impl ModeSystem {
    /// Assemble every local mode of `problem`.
    pub fn assemble_all(problem: &Problem) -> Result<Vec<ModeSystem>> {
        let domain = &problem.domain;
        let z = domain.basis(domain.z_axis());
        let d = chebyshev_derivative_matrix(z.size(), z.length());
        domain
            .local_mode_tuples()
            .into_iter()
            .map(|local| ModeSystem::assemble(problem, &d, local))
            .collect()
    }

    fn assemble(problem: &Problem, d: &Mat<f64>, local_modes: Vec<usize>) -> Result<Self> {
        let domain: &Domain = &problem.domain;
        let layout = ModeLayout {
            n_vars: problem.variables.len(),
            n_comps: domain.n_components(),
            nz: domain.nz(),
        };
        let global_modes = domain.global_modes(&local_modes);
        let wavenumbers: Vec<f64> = global_modes
            .iter()
            .enumerate()
            .map(|(axis, &m)| domain.wavenumber(axis, m))
            .collect();
        let size = layout.size();
        let nz = layout.nz;

        let mut m = SparseMatrix::new(size, size);
        let mut l = SparseMatrix::new(size, size);
        for (e, eq) in problem.equations.iter().enumerate() {
            for term in &eq.terms {
                let k = component_operator(term, &wavenumbers, layout.n_comps);
                let target = if term.time { &mut m } else { &mut l };
                for c_out in 0..layout.n_comps {
                    for c_in in 0..layout.n_comps {
                        let kc = term.coeff * k[c_out][c_in];
                        if kc == 0.0 {
                            continue;
                        }
                        for n in 0..nz {
                            let row = layout.index(e, c_out, n);
                            if term.dz == 0 {
                                target.push(row, layout.index(term.var.get(), c_in, n), kc);
                            } else {
                                for p in n + 1..nz {
                                    target.push(
                                        row,
                                        layout.index(term.var.get(), c_in, p),
                                        kc * d[(n, p)],
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        let tau_eqs: Vec<usize> = problem
            .equations
            .iter()
            .enumerate()
            .filter(|(_, e)| e.has_tau)
            .map(|(i, _)| i)
            .collect();
        let active: Vec<_> = problem
            .boundaries
            .iter()
            .filter(|b| b.condition.applies(&global_modes))
            .collect();
        if active.len() != tau_eqs.len() {
            return Err(SolverError::ill_posed(format!(
                "mode {:?} has {} applicable boundary conditions for {} tau equations",
                global_modes,
                active.len(),
                tau_eqs.len()
            )));
        }

        let mut bc_rows = Vec::new();
        let mut bc_values = Vec::new();
        let mut bc_entries = Vec::new();
        for (&e, bc) in tau_eqs.iter().zip(&active) {
            let wall = boundary_row(nz, bc.source.side);
            for c_out in 0..layout.n_comps {
                let row = layout.index(e, c_out, nz - 1);
                m.clear_row(row);
                l.clear_row(row);

                let mut entries = Vec::new();
                for term in &bc.terms {
                    let k = component_operator(term, &wavenumbers, layout.n_comps);
                    for c_in in 0..layout.n_comps {
                        let kc = term.coeff * k[c_out][c_in];
                        if kc == 0.0 {
                            continue;
                        }
                        for (p, &w) in wall.iter().enumerate() {
                            entries.push((layout.index(term.var.get(), c_in, p), kc * w));
                        }
                    }
                }
                let trace_slot = domain.pencil_offset(&local_modes, c_out) / nz;
                bc_rows.push(row);
                bc_values.push(bc.rhs_coeffs[trace_slot]);
                bc_entries.push(entries);
            }
        }

        let dirichlet = problem.dirichlet.clone();
        let m_pre = m.recombined(&layout, &dirichlet);
        let l_pre = l.recombined(&layout, &dirichlet);
        let bc_pre = bc_entries
            .iter()
            .map(|r| layout.recombine_row(r, &dirichlet))
            .collect();

        Ok(Self {
            local_modes,
            global_modes,
            layout,
            m,
            l,
            bc_rows,
            bc_values,
            m_pre,
            l_pre,
            bc_pre,
            dirichlet,
        })
    }

    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Dense `M + factor * L` in the recombined basis with boundary rows in
    /// place of the tau rows.
    pub fn stage_matrix(&self, factor: f64) -> Mat<f64> {
        let n = self.size();
        let mut a = Mat::zeros(n, n);
        self.m_pre.add_to_dense(1.0, &mut a);
        self.l_pre.add_to_dense(factor, &mut a);
        for (&row, entries) in self.bc_rows.iter().zip(&self.bc_pre) {
            for &(c, v) in entries {
                a[(row, c)] += v;
            }
        }
        a
    }

    /// Dense `L` in the recombined basis with boundary rows, for
    /// boundary-value solves.
    pub fn boundary_value_matrix(&self) -> Mat<f64> {
        let n = self.size();
        let mut a = Mat::zeros(n, n);
        self.l_pre.add_to_dense(1.0, &mut a);
        for (&row, entries) in self.bc_rows.iter().zip(&self.bc_pre) {
            for &(c, v) in entries {
                a[(row, c)] += v;
            }
        }
        a
    }

    /// Overwrite the boundary rows of a right-hand side with their targets.
    pub fn impose_boundary_values(&self, rhs: &mut [f64]) {
        for (&row, &value) in self.bc_rows.iter().zip(&self.bc_values) {
            rhs[row] = value;
        }
    }

    /// Map a solution in the recombined basis back to Chebyshev coefficients.
    pub fn recombine(&self, y: &[f64]) -> Vec<f64> {
        let lay = self.layout;
        let mut x = y.to_vec();
        for var in 0..lay.n_vars {
            if !self.dirichlet[var] {
                continue;
            }
            for comp in 0..lay.n_comps {
                for n in 0..lay.nz.saturating_sub(2) {
                    x[lay.index(var, comp, n)] -= y[lay.index(var, comp, n + 2)];
                }
            }
        }
        x
    }

    /// Copy this mode's pencils out of coefficient-layout arrays, one per
    /// variable or equation.
    pub fn gather(&self, domain: &Domain, arrays: &[&[f64]]) -> Vec<f64> {
        let lay = self.layout;
        let mut out = vec![0.0; lay.size()];
        for (v, data) in arrays.iter().enumerate() {
            for comp in 0..lay.n_comps {
                let offset = domain.pencil_offset(&self.local_modes, comp);
                let start = lay.index(v, comp, 0);
                out[start..start + lay.nz].copy_from_slice(&data[offset..offset + lay.nz]);
            }
        }
        out
    }

    /// Write this mode's pencils back into coefficient-layout arrays.
    pub fn scatter(&self, domain: &Domain, x: &[f64], arrays: &mut [Vec<f64>]) {
        let lay = self.layout;
        for (v, data) in arrays.iter_mut().enumerate() {
            for comp in 0..lay.n_comps {
                let offset = domain.pencil_offset(&self.local_modes, comp);
                let start = lay.index(v, comp, 0);
                data[offset..offset + lay.nz].copy_from_slice(&x[start..start + lay.nz]);
            }
        }
    }
}

/// Component coupling `K[out][in]` of a term's periodic derivatives.
fn component_operator(term: &LinearTerm, wavenumbers: &[f64], n_comps: usize) -> Vec<Vec<f64>> {
    let p = wavenumbers.len();
    let rotations: Vec<[[f64; 2]; 2]> = wavenumbers
        .iter()
        .zip(&term.dx)
        .map(|(&k, &order)| fourier_rotation(k, order))
        .collect();
    (0..n_comps)
        .map(|c_out| {
            (0..n_comps)
                .map(|c_in| {
                    (0..p)
                        .map(|a| {
                            let shift = p - 1 - a;
                            rotations[a][(c_out >> shift) & 1][(c_in >> shift) & 1]
                        })
                        .product()
                })
                .collect()
        })
        .collect()
}
