//! Per-mode direct solves with cached factorizations.

use faer::Mat;
use faer::linalg::solvers::{PartialPivLu, Solve};
use log::debug;

use crate::equations::ModeSystem;
use crate::types::ModeIndex;

struct CachedFactor {
    key: u64,
    lu: PartialPivLu<f64>,
}

/// Factorizes and solves the local mode systems of a problem.
///
/// Each mode keeps one factorization, tagged with the key it was built
/// for; asking for another key replaces it.
pub struct ModeSolver {
    systems: Vec<ModeSystem>,
    factors: Vec<Option<CachedFactor>>,
}

impl ModeSolver {
    pub fn new(systems: Vec<ModeSystem>) -> Self {
        let factors = systems.iter().map(|_| None).collect();
        Self { systems, factors }
    }

    pub fn systems(&self) -> &[ModeSystem] {
        &self.systems
    }

    pub fn n_modes(&self) -> usize {
        self.systems.len()
    }

    pub fn system(&self, mode: ModeIndex) -> Option<&ModeSystem> {
        self.systems.get(mode.get())
    }

    /// Key of the factorization currently held for `mode`.
    pub fn factor_key(&self, mode: ModeIndex) -> Option<u64> {
        self.factors.get(mode.get())?.as_ref().map(|c| c.key)
    }

    /// Make sure every mode holds a factorization for `key`, building the
    /// matrix with `build` where it does not.
    pub fn prepare<F>(&mut self, key: u64, build: F)
    where
        F: Fn(&ModeSystem) -> Mat<f64> + Sync,
    {
        let stale = self
            .factors
            .iter()
            .filter(|f| f.as_ref().is_none_or(|c| c.key != key))
            .count();
        if stale == 0 {
            return;
        }
        debug!("factorizing {} mode systems (key {:#x})", stale, key);

        let factorize = |(sys, slot): (&ModeSystem, &mut Option<CachedFactor>)| {
            if slot.as_ref().is_some_and(|c| c.key == key) {
                return;
            }
            let lu = build(sys).as_ref().partial_piv_lu();
            *slot = Some(CachedFactor { key, lu });
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.systems
                .par_iter()
                .zip(self.factors.par_iter_mut())
                .for_each(factorize);
        }
        #[cfg(not(feature = "parallel"))]
        self.systems.iter().zip(self.factors.iter_mut()).for_each(factorize);
    }

    /// Solve every mode for the given right-hand sides and return the
    /// solutions as Chebyshev coefficients.
    ///
    /// Modes whose factorization is missing produce NaN, which the caller's
    /// finiteness check reports.
    pub fn solve(&self, rhs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let solve_one = |((sys, factor), b): ((&ModeSystem, &Option<CachedFactor>), &Vec<f64>)| {
            let Some(factor) = factor else {
                return vec![f64::NAN; sys.size()];
            };
            let rhs = Mat::from_fn(b.len(), 1, |i, _| b[i]);
            let y = factor.lu.solve(&rhs);
            let y: Vec<f64> = (0..y.nrows()).map(|i| y[(i, 0)]).collect();
            sys.recombine(&y)
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.systems
                .par_iter()
                .zip(self.factors.par_iter())
                .zip(rhs.par_iter())
                .map(solve_one)
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        self.systems
            .iter()
            .zip(self.factors.iter())
            .zip(rhs.iter())
            .map(solve_one)
            .collect()
    }
}

/// Cache key of a stage matrix `M + factor L`.
pub fn stage_key(factor: f64) -> u64 {
    factor.to_bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::domain::Domain;
    use crate::equations::{ProblemBuilder, constant, diff, dt, field};
    use crate::parallel::SerialCommunicator;
    use crate::types::Side;
    use crate::equations::ModeCondition;
    use std::sync::Arc;

    fn heat_systems() -> Vec<ModeSystem> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", 10, (0.0, 1.0)).unwrap().into(),
        ];
        let domain = Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap());
        let problem = ProblemBuilder::new(domain, &["b", "bz"])
            .declare_auxiliary("bz", diff("z", field("b")))
            .dirichlet(&["b"])
            .equation(
                dt(field("b")) - diff("x", diff("x", field("b"))) - diff("z", field("bz")),
                constant(0.0),
            )
            .equation(field("bz") - diff("z", field("b")), constant(0.0))
            .boundary(Side::Left, field("b"), constant(0.0), ModeCondition::Always)
            .boundary(Side::Right, field("b"), constant(1.0), ModeCondition::Always)
            .build()
            .unwrap();
        ModeSystem::assemble_all(&problem).unwrap()
    }

    #[test]
    fn test_factorizations_are_cached() {
        let mut solver = ModeSolver::new(heat_systems());
        let key = stage_key(0.05);
        solver.prepare(key, |s| s.stage_matrix(0.05));
        let rhs: Vec<Vec<f64>> = solver
            .systems()
            .iter()
            .map(|s| {
                let mut r = vec![0.0; s.size()];
                s.impose_boundary_values(&mut r);
                r
            })
            .collect();
        let first = solver.solve(&rhs);
        // Same key: the closure must not run again.
        solver.prepare(key, |_| panic!("refactorized a cached mode"));
        assert_eq!(first, solver.solve(&rhs));
        for mode in ModeIndex::iter(solver.n_modes()) {
            assert_eq!(solver.factor_key(mode), Some(key));
        }

        // A new key evicts the old factorization.
        let other = stage_key(0.1);
        solver.prepare(other, |s| s.stage_matrix(0.1));
        assert_eq!(solver.factor_key(ModeIndex::new(0)), Some(other));
        assert!(solver.system(ModeIndex::new(solver.n_modes())).is_none());
        for x in &first {
            assert!(x.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_missing_factor_yields_nan() {
        let solver = ModeSolver::new(heat_systems());
        let rhs: Vec<Vec<f64>> = solver.systems().iter().map(|s| vec![0.0; s.size()]).collect();
        let out = solver.solve(&rhs);
        assert!(out[0].iter().all(|v| v.is_nan()));
        assert_eq!(solver.factor_key(ModeIndex::new(0)), None);
    }
}
