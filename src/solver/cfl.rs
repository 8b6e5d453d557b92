//! Adaptive time step from the advective CFL condition.
//!
//! `dt = safety / max(Σ_axis |v_axis| / Δ_axis)`, recomputed every
//! `cadence` iterations and smoothed so the implicit factorizations are not
//! rebuilt for small fluctuations.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::equations::{Expr, field};
use crate::error::{Result, SolverError};
use crate::evaluate::{GridEvaluator, Value};
use crate::field::Field;
use crate::types::GridScale;

/// CFL controller settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CflConfig {
    pub initial_dt: f64,
    /// Iterations between recomputations.
    pub cadence: u64,
    pub safety: f64,
    /// Largest allowed growth factor per update.
    pub max_change: f64,
    /// Smallest allowed shrink factor per update.
    pub min_change: f64,
    pub max_dt: f64,
    /// Relative change below which the previous dt is kept.
    pub threshold: f64,
}

impl Default for CflConfig {
    fn default() -> Self {
        Self {
            initial_dt: 0.125,
            cadence: 10,
            safety: 1.0,
            max_change: 1.5,
            min_change: 0.5,
            max_dt: 0.125,
            threshold: 0.05,
        }
    }
}

impl CflConfig {
    pub fn with_cadence(mut self, cadence: u64) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_safety(mut self, safety: f64) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_initial_dt(mut self, dt: f64) -> Self {
        self.initial_dt = dt;
        self
    }

    pub fn with_max_dt(mut self, dt: f64) -> Self {
        self.max_dt = dt;
        self
    }
}

/// CFL controller for a fixed set of velocity expressions.
pub struct Cfl {
    config: CflConfig,
    domain: Arc<Domain>,
    velocities: Vec<(Expr, usize)>,
    spacing: Vec<Vec<f64>>,
    dt: f64,
    start_iteration: Option<u64>,
}

impl Cfl {
    pub fn new(domain: Arc<Domain>, config: CflConfig) -> Result<Self> {
        if !(config.safety > 0.0 && config.initial_dt > 0.0 && config.max_dt > 0.0) {
            return Err(SolverError::configuration(
                "CFL safety, initial_dt and max_dt must be positive",
            ));
        }
        if config.cadence == 0 {
            return Err(SolverError::configuration("CFL cadence must be at least 1"));
        }
        if config.initial_dt > config.max_dt {
            return Err(SolverError::configuration(format!(
                "CFL initial_dt {} exceeds max_dt {}",
                config.initial_dt, config.max_dt
            )));
        }
        Ok(Self {
            dt: config.initial_dt,
            config,
            domain,
            velocities: Vec::new(),
            spacing: Vec::new(),
            start_iteration: None,
        })
    }

    /// Register a velocity expression advecting along `axis`.
    pub fn add_velocity(&mut self, velocity: Expr, axis: &str) -> Result<()> {
        let index = self
            .domain
            .axis_index(axis)
            .ok_or_else(|| SolverError::configuration(format!("unknown axis '{}'", axis)))?;
        self.velocities.push((velocity, index));
        self.spacing
            .push(self.domain.local_spacing_field(index, GridScale::Dealias));
        Ok(())
    }

    /// Register velocity fields by name, `(field, axis)`.
    pub fn add_velocities(&mut self, pairs: &[(&str, &str)]) -> Result<()> {
        for &(name, axis) in pairs {
            self.add_velocity(field(name), axis)?;
        }
        Ok(())
    }

    pub fn current_dt(&self) -> f64 {
        self.dt
    }

    /// Maximum over all workers of `Σ |v| / Δ` (collective).
    ///
    /// NaN when the velocities could not be evaluated or were not finite
    /// on any worker; `Err` only for communication failures.
    pub fn max_frequency(
        &self,
        fields: &[Field],
        parameters: &BTreeMap<String, f64>,
    ) -> Result<f64> {
        let local = self.local_frequency(fields, parameters);
        let failed = match &local {
            Ok(f) if f.is_finite() => 0.0,
            Ok(f) => {
                warn!("CFL frequency is {} on rank {}", f, self.domain.distributor().rank());
                1.0
            }
            Err(e) => {
                warn!("CFL velocity evaluation failed: {}", e);
                1.0
            }
        };
        let comm = self.domain.comm();
        if comm.all_reduce_max(failed)? > 0.0 {
            return Ok(f64::NAN);
        }
        comm.all_reduce_max(local.unwrap_or(0.0))
    }

    fn local_frequency(&self, fields: &[Field], parameters: &BTreeMap<String, f64>) -> Result<f64> {
        let mut ev = GridEvaluator::new(
            Arc::clone(&self.domain),
            fields,
            parameters,
            GridScale::Dealias,
        );
        let n = self.domain.grid_len(GridScale::Dealias);
        let mut freq = vec![0.0; n];
        for ((velocity, _), spacing) in self.velocities.iter().zip(&self.spacing) {
            match ev.evaluate(velocity)? {
                Value::Scalar(v) => {
                    for (f, h) in freq.iter_mut().zip(spacing) {
                        *f += v.abs() / h;
                    }
                }
                Value::Grid(g) => {
                    for ((f, v), h) in freq.iter_mut().zip(&g).zip(spacing) {
                        *f += v.abs() / h;
                    }
                }
            }
        }
        // NaN-propagating max; f64::max would drop NaN.
        Ok(freq
            .into_iter()
            .fold(0.0, |m, f| if f.is_nan() || f > m { f } else { m }))
    }

    /// Time step for the coming iteration (collective on update iterations).
    ///
    /// Fails closed: when the velocities cannot be evaluated the previous
    /// dt is kept.
    pub fn compute_dt(
        &mut self,
        fields: &[Field],
        parameters: &BTreeMap<String, f64>,
        iteration: u64,
    ) -> Result<f64> {
        let start = *self.start_iteration.get_or_insert(iteration);
        if (iteration - start) % self.config.cadence != 0 {
            return Ok(self.dt);
        }
        let frequency = self.max_frequency(fields, parameters)?;
        self.dt = self.update(frequency);
        Ok(self.dt)
    }

    /// Apply the candidate from `frequency` to the stored dt.
    pub fn update(&self, frequency: f64) -> f64 {
        let c = &self.config;
        if frequency.is_nan() {
            warn!("CFL frequency is NaN; keeping dt {:.6e}", self.dt.min(c.max_dt));
            return self.dt.min(c.max_dt);
        }
        let candidate = if frequency > 0.0 {
            c.safety / frequency
        } else {
            f64::INFINITY
        };
        let dt = candidate
            .min(c.max_change * self.dt)
            .max(c.min_change * self.dt)
            .min(c.max_dt);
        if ((dt - self.dt) / self.dt).abs() > c.threshold {
            debug!("CFL dt {:.6e} -> {:.6e}", self.dt, dt);
            dt
        } else {
            self.dt
        }
    }
}
