//! Integrator state and stopping criteria.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::field::Field;

/// Lifecycle of an [`InitialValueSolver`](super::InitialValueSolver).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverStatus {
    Uninitialized,
    Ready,
    Stepping,
    Halted,
    /// A step produced non-finite values; the state is unusable.
    Diverged,
}

/// Halting criteria; the first one reached stops the integrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConditions {
    pub stop_sim_time: Option<f64>,
    /// Seconds of wall time since the solver was built.
    pub stop_wall_time: Option<f64>,
    pub stop_iteration: Option<u64>,
}

impl StopConditions {
    pub fn with_sim_time(mut self, t: f64) -> Self {
        self.stop_sim_time = Some(t);
        self
    }

    pub fn with_wall_time(mut self, seconds: f64) -> Self {
        self.stop_wall_time = Some(seconds);
        self
    }

    pub fn with_iteration(mut self, n: u64) -> Self {
        self.stop_iteration = Some(n);
        self
    }

    /// Whether any criterion is met. `wall_time` must already be agreed
    /// between workers.
    pub fn reached(&self, sim_time: f64, wall_time: f64, iteration: u64) -> bool {
        self.stop_sim_time.is_some_and(|t| sim_time >= t)
            || self.stop_wall_time.is_some_and(|w| wall_time >= w)
            || self.stop_iteration.is_some_and(|n| iteration >= n)
    }
}

/// Fields and clocks of a running simulation.
#[derive(Clone, Debug)]
pub struct SolverState {
    pub fields: Vec<Field>,
    pub sim_time: f64,
    pub iteration: u64,
    /// Size of the last completed step.
    pub dt: f64,
    started: Instant,
}

impl SolverState {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            sim_time: 0.0,
            iteration: 0,
            dt: 0.0,
            started: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn wall_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| SolverError::configuration(format!("no field named '{}'", name)))
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        self.fields
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| SolverError::configuration(format!("no field named '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_condition_wins() {
        let stop = StopConditions::default().with_sim_time(10.0).with_iteration(5);
        assert!(!stop.reached(1.0, 0.0, 4));
        assert!(stop.reached(1.0, 0.0, 5));
        assert!(stop.reached(10.0, 0.0, 0));
        assert!(!StopConditions::default().reached(1e9, 1e9, u64::MAX));
        assert!(StopConditions::default().with_wall_time(2.0).reached(0.0, 2.5, 0));
    }

    #[test]
    fn test_missing_keys_deserialize_to_none() {
        let stop: StopConditions = serde_json::from_str(r#"{"stop_iteration": 3}"#).unwrap();
        assert_eq!(stop.stop_iteration, Some(3));
        assert_eq!(stop.stop_sim_time, None);
    }
}
