//! IMEX time stepping of initial-value problems.

use log::{error, info};

use crate::equations::{ModeSystem, Problem, ProblemKind};
use crate::error::{Result, SolverError};
use crate::field::Field;
use crate::time::{IntegratorInfo, StandardIntegrator, Tableau};

use super::modes::{ModeSolver, stage_key};
use super::state::{SolverState, SolverStatus, StopConditions};
use super::{explicit_rhs, field_coefficients, gather_modes, scatter_modes};

/// Advances an initial-value [`Problem`] with an IMEX Runge-Kutta scheme.
///
/// ```text
/// Uninitialized --build--> Ready --step--> Stepping --stop reached--> Halted
///                                             \--non-finite--> Diverged
/// ```
///
/// Stop conditions that already hold at build time go straight to Halted.
pub struct InitialValueSolver {
    problem: Problem,
    scheme: StandardIntegrator,
    tableau: Tableau,
    modes: Option<ModeSolver>,
    status: SolverStatus,
    stop: StopConditions,
    state: SolverState,
}

impl InitialValueSolver {
    pub fn new(problem: Problem, scheme: StandardIntegrator) -> Self {
        let state = SolverState::new(problem.new_fields());
        Self {
            tableau: scheme.tableau(),
            problem,
            scheme,
            modes: None,
            status: SolverStatus::Uninitialized,
            stop: StopConditions::default(),
            state,
        }
    }

    pub fn with_stop_conditions(mut self, stop: StopConditions) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_conditions(&self) -> &StopConditions {
        &self.stop
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn status(&self) -> SolverStatus {
        self.status
    }

    pub fn state(&self) -> &SolverState {
        &self.state
    }

    pub fn sim_time(&self) -> f64 {
        self.state.sim_time
    }

    pub fn iteration(&self) -> u64 {
        self.state.iteration
    }

    pub fn fields(&self) -> &[Field] {
        &self.state.fields
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.state.field(name)
    }

    /// Mutable access to every field, for initial conditions that couple
    /// several of them.
    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.state.fields
    }

    /// Mutable access for setting initial conditions.
    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.state.field_mut(name)
    }

    pub fn proceed(&self) -> bool {
        !matches!(self.status, SolverStatus::Halted | SolverStatus::Diverged)
    }

    /// Assemble the per-mode operators (collective). Uninitialized → Ready,
    /// or Halted if a stop condition is already met.
    pub fn build(&mut self) -> Result<()> {
        if self.problem.kind != ProblemKind::InitialValue {
            return Err(SolverError::configuration(
                "initial-value solver needs a problem with time derivatives",
            ));
        }
        let systems = ModeSystem::assemble_all(&self.problem)?;
        let size = systems.first().map_or(0, |s| s.size());
        info!(
            "Built {} solver: {} local modes of size {}, {} stages",
            self.scheme.name(),
            systems.len(),
            size,
            self.tableau.n_stages()
        );
        self.modes = Some(ModeSolver::new(systems));
        self.status = SolverStatus::Ready;
        self.check_stop()?;
        Ok(())
    }

    /// Halt if any stop condition holds, with wall time agreed between
    /// workers (collective).
    fn check_stop(&mut self) -> Result<()> {
        let wall = self
            .problem
            .domain
            .comm()
            .all_reduce_max(self.state.wall_time())?;
        if self
            .stop
            .reached(self.state.sim_time, wall, self.state.iteration)
        {
            info!(
                "Stop condition reached at iteration {}, sim time {:.6e}",
                self.state.iteration, self.state.sim_time
            );
            self.status = SolverStatus::Halted;
        }
        Ok(())
    }

    /// Advance by `dt` (collective).
    ///
    /// Halted solvers return `Halted` without touching the state.
    pub fn step(&mut self, dt: f64) -> Result<SolverStatus> {
        match self.status {
            SolverStatus::Uninitialized => {
                return Err(SolverError::configuration("step called before build"));
            }
            SolverStatus::Halted => return Ok(SolverStatus::Halted),
            SolverStatus::Diverged => {
                return Err(SolverError::configuration(
                    "step called after the solution diverged",
                ));
            }
            SolverStatus::Ready | SolverStatus::Stepping => {}
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SolverError::configuration(format!(
                "time step must be positive and finite, got {}",
                dt
            )));
        }

        let modes = self
            .modes
            .as_mut()
            .ok_or_else(|| SolverError::configuration("step called before build"))?;
        let domain = std::sync::Arc::clone(&self.problem.domain);
        let tableau = &self.tableau;

        for f in &mut self.state.fields {
            f.to_coefficient()?;
        }
        let x0 = gather_modes(
            modes.systems(),
            &domain,
            &field_coefficients(&self.state.fields)?,
        );
        let mx0: Vec<Vec<f64>> = modes
            .systems()
            .iter()
            .zip(&x0)
            .map(|(s, x)| s.m.mul_vec(x))
            .collect();

        let mut f_hist: Vec<Vec<Vec<f64>>> = Vec::with_capacity(tableau.n_stages());
        let mut lx_hist: Vec<Vec<Vec<f64>>> = Vec::with_capacity(tableau.n_stages());
        let mut x_prev = x0;

        for i in 1..=tableau.n_stages() {
            let f = explicit_rhs(&self.problem, &self.state.fields)?;
            f_hist.push(gather_modes(modes.systems(), &domain, &f));
            lx_hist.push(
                modes
                    .systems()
                    .iter()
                    .zip(&x_prev)
                    .map(|(s, x)| s.l.mul_vec(x))
                    .collect(),
            );

            let factor = dt * tableau.diagonal(i);
            modes.prepare(stage_key(factor), |s| s.stage_matrix(factor));

            let rhs: Vec<Vec<f64>> = modes
                .systems()
                .iter()
                .enumerate()
                .map(|(mode, sys)| {
                    let mut r = mx0[mode].clone();
                    for j in 0..i {
                        let h = dt * tableau.h(i, j);
                        let a = dt * tableau.a(i, j);
                        let terms = f_hist[j][mode].iter().zip(&lx_hist[j][mode]);
                        for (r, (f, lx)) in r.iter_mut().zip(terms) {
                            *r += h * f - a * lx;
                        }
                    }
                    sys.impose_boundary_values(&mut r);
                    r
                })
                .collect();

            let x = modes.solve(&rhs);
            scatter_modes(modes.systems(), &domain, &x, &mut self.state.fields)?;
            if let Err(e) = check_finite(&self.problem, &self.state, i) {
                self.status = SolverStatus::Diverged;
                return Err(e);
            }
            x_prev = x;
        }

        self.state.sim_time += dt;
        self.state.iteration += 1;
        self.state.dt = dt;
        self.status = SolverStatus::Stepping;
        self.check_stop()?;
        Ok(self.status)
    }
}

/// Agree across workers that every coefficient is finite.
fn check_finite(problem: &Problem, state: &SolverState, stage: usize) -> Result<()> {
    let bad = state.fields.iter().find(|f| {
        f.coefficients()
            .map(|c| c.iter().any(|v| !v.is_finite()))
            .unwrap_or(true)
    });
    let flag = if bad.is_some() { 1.0 } else { 0.0 };
    if problem.domain.comm().all_reduce_max(flag)? == 0.0 {
        return Ok(());
    }
    let detail = match bad {
        Some(f) => format!("non-finite coefficients in '{}'", f.name()),
        None => "non-finite coefficients on another worker".to_string(),
    };
    error!(
        "Divergence at iteration {}, sim time {:.6e}, stage {}: {}",
        state.iteration, state.sim_time, stage, detail
    );
    Err(SolverError::Divergence {
        iteration: state.iteration,
        sim_time: state.sim_time,
        stage,
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::domain::Domain;
    use crate::equations::{ModeCondition, ProblemBuilder, constant, diff, dt, field};
    use crate::parallel::SerialCommunicator;
    use crate::types::Side;
    use std::f64::consts::PI;
    use std::sync::Arc;

    /// dt(b) - dx(dx(b)) - dz(bz) = 0 with b = 0 on both walls.
    fn heat_problem(rhs: crate::equations::Expr) -> Problem {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", 16, (0.0, 1.0)).unwrap().into(),
        ];
        let domain = Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap());
        ProblemBuilder::new(domain, &["b", "bz"])
            .declare_auxiliary("bz", diff("z", field("b")))
            .dirichlet(&["b"])
            .equation(
                dt(field("b")) - diff("x", diff("x", field("b"))) - diff("z", field("bz")),
                rhs,
            )
            .equation(field("bz") - diff("z", field("b")), constant(0.0))
            .boundary(Side::Left, field("b"), constant(0.0), ModeCondition::Always)
            .boundary(Side::Right, field("b"), constant(0.0), ModeCondition::Always)
            .build()
            .unwrap()
    }

    fn set_mode(solver: &mut InitialValueSolver) {
        let b = solver.field_mut("b").unwrap();
        b.set_grid_fn(|p| (PI * p[0]).cos() * (PI * p[1]).sin()).unwrap();
    }

    #[test]
    fn test_heat_mode_decays_at_analytic_rate() {
        let mut solver = InitialValueSolver::new(heat_problem(constant(0.0)), StandardIntegrator::RK443);
        solver.build().unwrap();
        set_mode(&mut solver);
        let dt = 1e-3;
        for _ in 0..100 {
            solver.step(dt).unwrap();
        }
        let rate = 2.0 * PI * PI;
        let b = solver.field_mut("b").unwrap();
        b.to_grid().unwrap();
        let domain = Arc::clone(b.domain());
        let x = domain.local_coordinate(0, b.scale());
        let z = domain.local_coordinate(1, b.scale());
        let decay = (-rate * 0.1).exp();
        for ((v, xi), zi) in b.grid().unwrap().iter().zip(&x).zip(&z) {
            let expected = decay * (PI * xi).cos() * (PI * zi).sin();
            assert!((v - expected).abs() < 1e-6, "{} vs {}", v, expected);
        }
        assert!((solver.sim_time() - 0.1).abs() < 1e-12);
        assert_eq!(solver.iteration(), 100);
    }

    #[test]
    fn test_lifecycle() {
        let mut solver = InitialValueSolver::new(heat_problem(constant(0.0)), StandardIntegrator::RK111)
            .with_stop_conditions(StopConditions::default().with_iteration(2));
        assert_eq!(solver.status(), SolverStatus::Uninitialized);
        assert!(solver.step(0.1).is_err());
        solver.build().unwrap();
        assert_eq!(solver.status(), SolverStatus::Ready);
        assert_eq!(solver.step(0.01).unwrap(), SolverStatus::Stepping);
        assert_eq!(solver.step(0.01).unwrap(), SolverStatus::Halted);
        let t = solver.sim_time();
        assert_eq!(solver.step(0.01).unwrap(), SolverStatus::Halted);
        assert_eq!(solver.sim_time(), t);
        assert!(!solver.proceed());
    }

    #[test]
    fn test_blow_up_is_divergence() {
        // Explicit growth b·b·b far beyond what one step can resolve.
        let rhs = 1e6 * field("b") * field("b") * field("b");
        let mut solver = InitialValueSolver::new(heat_problem(rhs), StandardIntegrator::RK443);
        solver.build().unwrap();
        set_mode(&mut solver);
        let mut result = Ok(SolverStatus::Ready);
        for _ in 0..50 {
            result = solver.step(1.0);
            if result.is_err() {
                break;
            }
        }
        let err = result.unwrap_err();
        assert!(err.is_divergence(), "{}", err);
        assert_eq!(solver.status(), SolverStatus::Diverged);
        assert!(!solver.proceed());
        let again = solver.step(1e-3).unwrap_err();
        assert!(!again.is_divergence());
        assert!(matches!(again, SolverError::Configuration(_)));
    }

    #[test]
    fn test_stop_conditions_already_met_at_build() {
        for stop in [
            StopConditions::default().with_iteration(0),
            StopConditions::default().with_sim_time(0.0),
        ] {
            let mut solver =
                InitialValueSolver::new(heat_problem(constant(0.0)), StandardIntegrator::RK111)
                    .with_stop_conditions(stop);
            solver.build().unwrap();
            assert_eq!(solver.status(), SolverStatus::Halted);
            assert!(!solver.proceed());
            assert_eq!(solver.step(0.01).unwrap(), SolverStatus::Halted);
            assert_eq!(solver.iteration(), 0);
            assert_eq!(solver.sim_time(), 0.0);
        }
    }

    #[test]
    fn test_rejects_bad_dt() {
        let mut solver = InitialValueSolver::new(heat_problem(constant(0.0)), StandardIntegrator::RK443);
        solver.build().unwrap();
        assert!(solver.step(0.0).is_err());
        assert!(solver.step(f64::NAN).is_err());
    }
}
