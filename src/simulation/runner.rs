//! Simulation runner implementation.
//!
//! Provides the main loop of a horizontal convection run: adaptive time
//! step, IMEX stepping, flow monitoring and scheduled output.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};

use crate::domain::Domain;
use crate::equations::{HorizontalConvection, field, integrate_axis};
use crate::error::Result;
use crate::io::{Cadence, Evaluator};
use crate::parallel::Communicator;
use crate::solver::{Cfl, FlowProperties, InitialValueSolver, SolverStatus};

use super::config::RunConfig;

// =============================================================================
// Simulation Result
// =============================================================================

/// Summary of a completed run.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    /// Final simulation time reached.
    pub final_time: f64,
    /// Total number of time steps taken.
    pub n_steps: u64,
    /// Smallest time step used, 0 if no step was taken.
    pub dt_min: f64,
    /// Largest time step used, 0 if no step was taken.
    pub dt_max: f64,
    /// Wall-clock seconds since the solver was built.
    pub wall_time: f64,
    /// Last Reynolds number maximum, if flow properties were computed.
    pub max_reynolds: Option<f64>,
    pub status: SolverStatus,
}

// =============================================================================
// Simulation Runner
// =============================================================================

/// One worker's view of a horizontal convection run.
///
/// Every worker of a group constructs its own `Simulation` from the same
/// [`RunConfig`] and calls [`run`](Self::run); all collective operations
/// then happen in the same order everywhere.
pub struct Simulation {
    config: RunConfig,
    domain: Arc<Domain>,
    solver: InitialValueSolver,
    cfl: Cfl,
    flow: FlowProperties,
    output: Evaluator,
    parameters: BTreeMap<String, f64>,
}

impl Simulation {
    /// Build the domain, equations, solver and output streams, and set
    /// the initial buoyancy (collective).
    pub fn new(config: RunConfig, comm: Arc<dyn Communicator>) -> Result<Self> {
        config.validate()?;
        let dim = config.dim;
        let domain = Arc::new(config.domain.build(dim, comm)?);
        let model = config.physics.model();

        let problem = model.problem(Arc::clone(&domain))?;
        let parameters = problem.parameters.clone();
        let mut solver =
            InitialValueSolver::new(problem, config.integrator).with_stop_conditions(config.stop);
        solver.build()?;
        model.initial_state(
            solver.fields_mut(),
            config.physics.initial_buoyancy,
            config.physics.noise,
        )?;

        let mut cfl = Cfl::new(Arc::clone(&domain), config.cfl.clone())?;
        cfl.add_velocities(HorizontalConvection::velocity_names(dim))?;

        let mut flow = FlowProperties::new(Arc::clone(&domain), config.output.log_cadence);
        for (name, expr) in model.flow_properties(dim) {
            flow.add_property(name, expr);
        }

        let mut output = Evaluator::new(Arc::clone(&domain), &config.output.dir);
        if let Some(dt) = config.output.snapshot_dt {
            let snapshots = output.add_file_handler(
                "snapshots",
                Cadence::SimTime(dt),
                config.output.snapshot_max_writes,
            );
            for &v in HorizontalConvection::snapshot_names(dim) {
                snapshots.add_task(v, field(v));
            }
        }
        if let (3, Some(dt)) = (dim, config.output.averages_dt) {
            let averages = output.add_file_handler(
                "2d_averages",
                Cadence::SimTime(dt),
                config.output.averages_max_writes,
            );
            for &v in HorizontalConvection::average_names() {
                averages.add_task(v, integrate_axis("y", field(v)));
            }
        }
        if let Some(n) = config.output.diagnostics_iter {
            output
                .add_file_handler(
                    "diagnostics",
                    Cadence::Iteration(n),
                    config.output.diagnostics_max_writes,
                )
                .add_tasks(HorizontalConvection::diagnostic_tasks(&domain));
        }

        info!(
            "{}D horizontal convection: Ra = {:.3e}, Pr = {}, {:?} walls",
            dim, config.physics.rayleigh, config.physics.prandtl, config.physics.walls
        );

        Ok(Self {
            config,
            domain,
            solver,
            cfl,
            flow,
            output,
            parameters,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn solver(&self) -> &InitialValueSolver {
        &self.solver
    }

    /// Mutable access, e.g. to replace the initial state before `run`.
    pub fn solver_mut(&mut self) -> &mut InitialValueSolver {
        &mut self.solver
    }

    pub fn flow(&self) -> &FlowProperties {
        &self.flow
    }

    /// Run until a stop condition is reached (collective).
    pub fn run(&mut self) -> Result<SimulationResult> {
        self.run_with_callback(|_| {})
    }

    /// Run, calling `callback` after every completed step.
    ///
    /// A divergence flushes all output written so far before the error is
    /// returned.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<SimulationResult>
    where
        F: FnMut(&InitialValueSolver),
    {
        let mut dt_min_used = f64::INFINITY;
        let mut dt_max_used: f64 = 0.0;

        self.write_output()?;
        info!("Starting main loop");

        while self.solver.proceed() {
            let dt = self.cfl.compute_dt(
                self.solver.fields(),
                &self.parameters,
                self.solver.iteration(),
            )?;

            if let Err(e) = self.solver.step(dt) {
                if e.is_divergence() {
                    error!("{}", e);
                    if let Err(flush) = self.output.flush() {
                        warn!("Output flush after divergence failed: {}", flush);
                    }
                }
                return Err(e);
            }

            dt_min_used = dt_min_used.min(dt);
            dt_max_used = dt_max_used.max(dt);

            let iteration = self.solver.iteration();
            if self.flow.due(iteration) {
                self.flow.update(self.solver.fields(), &self.parameters)?;
                info!(
                    "Iteration: {}, Time: {:.6e}, dt: {:.6e}, max(Re) = {:.3}, <K> = {:.6e}",
                    iteration,
                    self.solver.sim_time(),
                    dt,
                    self.flow.max("Re").unwrap_or(f64::NAN),
                    self.flow.volume_average("K").unwrap_or(f64::NAN),
                );
            }

            self.write_output()?;
            callback(&self.solver);
        }

        self.output.flush()?;

        let state = self.solver.state();
        let result = SimulationResult {
            final_time: state.sim_time,
            n_steps: state.iteration,
            dt_min: if state.iteration == 0 { 0.0 } else { dt_min_used },
            dt_max: dt_max_used,
            wall_time: state.wall_time(),
            max_reynolds: self.flow.max("Re"),
            status: self.solver.status(),
        };
        info!(
            "Run complete: {} iterations, t = {:.6e}, {:.2} s wall, dt in [{:.3e}, {:.3e}]",
            result.n_steps, result.final_time, result.wall_time, result.dt_min, result.dt_max
        );
        Ok(result)
    }

    fn write_output(&mut self) -> Result<()> {
        let state = self.solver.state();
        self.output.evaluate_scheduled(
            self.solver.fields(),
            &self.parameters,
            state.iteration,
            state.sim_time,
            state.wall_time(),
            false,
        )
    }
}
