//! Additive (IMEX) Runge-Kutta schemes.
//!
//! The linear operator is treated implicitly with a diagonally implicit
//! tableau `A` and the explicit right-hand side with `H`. With stage 0 being
//! the initial state, stage `i` solves
//!
//! ```text
//! (M + dt a_ii L) X_i = M X_0 + dt Σ_{j<i} (h_ij F_j - a_ij L X_j)
//! ```
//!
//! and the last stage is the new state (all schemes here are stiffly
//! accurate).
//!
//! # Example
//! ```
//! use hc_rs::time::{IntegratorInfo, StandardIntegrator};
//!
//! let scheme = StandardIntegrator::default();
//! assert_eq!(scheme.name(), "rk443");
//! let tableau = scheme.tableau();
//! assert_eq!(tableau.n_stages(), 4);
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// IntegratorInfo Trait (non-generic, dyn-compatible)
// =============================================================================

/// Non-generic information about an IMEX scheme.
pub trait IntegratorInfo: Send + Sync {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Order of accuracy.
    fn order(&self) -> usize;

    /// Number of implicit solves per step.
    fn n_stages(&self) -> usize;

    /// Butcher tableaux of the scheme.
    fn tableau(&self) -> Tableau;

    /// Times at which stages are evaluated relative to the step start.
    fn stage_times(&self, dt: f64) -> Vec<f64> {
        self.tableau().c.iter().map(|c| c * dt).collect()
    }
}

/// Coefficients of an IMEX scheme with `s` stages.
///
/// `implicit[i]` has `i + 1` entries (row `i + 1` of the implicit tableau,
/// whose diagonal is the last entry); `explicit[i]` has `i + 1` entries and
/// weights the right-hand sides of stages `0..=i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tableau {
    pub implicit: Vec<Vec<f64>>,
    pub explicit: Vec<Vec<f64>>,
    /// Stage times as fractions of `dt`, including stage 0.
    pub c: Vec<f64>,
}

impl Tableau {
    pub fn n_stages(&self) -> usize {
        self.implicit.len()
    }

    /// Implicit coefficient `a_ij` for stage `i` (1-based) and earlier stage `j`.
    pub fn a(&self, i: usize, j: usize) -> f64 {
        self.implicit[i - 1].get(j).copied().unwrap_or(0.0)
    }

    /// Explicit coefficient `h_ij`; zero on and above the diagonal.
    pub fn h(&self, i: usize, j: usize) -> f64 {
        self.explicit[i - 1].get(j).copied().unwrap_or(0.0)
    }

    /// Diagonal implicit coefficient of stage `i` (1-based).
    pub fn diagonal(&self, i: usize) -> f64 {
        self.a(i, i)
    }
}

// =============================================================================
// Schemes
// =============================================================================

/// Third-order, four-stage scheme of Ascher, Ruuth and Spiteri (1997, §2.8).
#[derive(Clone, Copy, Debug, Default)]
pub struct RK443;

impl IntegratorInfo for RK443 {
    fn name(&self) -> &'static str {
        "rk443"
    }

    fn order(&self) -> usize {
        3
    }

    fn n_stages(&self) -> usize {
        4
    }

    fn tableau(&self) -> Tableau {
        Tableau {
            implicit: vec![
                vec![0.0, 0.5],
                vec![0.0, 1.0 / 6.0, 0.5],
                vec![0.0, -0.5, 0.5, 0.5],
                vec![0.0, 1.5, -1.5, 0.5, 0.5],
            ],
            explicit: vec![
                vec![0.5],
                vec![11.0 / 18.0, 1.0 / 18.0],
                vec![5.0 / 6.0, -5.0 / 6.0, 0.5],
                vec![0.25, 1.75, 0.75, -1.75],
            ],
            c: vec![0.0, 0.5, 2.0 / 3.0, 0.5, 1.0],
        }
    }
}

/// Second-order, two-stage L-stable scheme (Ascher, Ruuth and Spiteri, §2.6).
#[derive(Clone, Copy, Debug, Default)]
pub struct RK222;

impl IntegratorInfo for RK222 {
    fn name(&self) -> &'static str {
        "rk222"
    }

    fn order(&self) -> usize {
        2
    }

    fn n_stages(&self) -> usize {
        2
    }

    fn tableau(&self) -> Tableau {
        let gamma = 1.0 - 1.0 / 2f64.sqrt();
        let delta = 1.0 - 1.0 / (2.0 * gamma);
        Tableau {
            implicit: vec![vec![0.0, gamma], vec![0.0, 1.0 - gamma, gamma]],
            explicit: vec![vec![gamma], vec![delta, 1.0 - delta]],
            c: vec![0.0, gamma, 1.0],
        }
    }
}

/// First-order backward/forward Euler.
#[derive(Clone, Copy, Debug, Default)]
pub struct RK111;

impl IntegratorInfo for RK111 {
    fn name(&self) -> &'static str {
        "rk111"
    }

    fn order(&self) -> usize {
        1
    }

    fn n_stages(&self) -> usize {
        1
    }

    fn tableau(&self) -> Tableau {
        Tableau {
            implicit: vec![vec![0.0, 1.0]],
            explicit: vec![vec![1.0]],
            c: vec![0.0, 1.0],
        }
    }
}

// =============================================================================
// Standard Integrator Enum
// =============================================================================

/// Runtime selection of the built-in schemes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardIntegrator {
    /// RK443 (default)
    #[default]
    RK443,
    RK222,
    RK111,
}

impl IntegratorInfo for StandardIntegrator {
    fn name(&self) -> &'static str {
        match self {
            StandardIntegrator::RK443 => RK443.name(),
            StandardIntegrator::RK222 => RK222.name(),
            StandardIntegrator::RK111 => RK111.name(),
        }
    }

    fn order(&self) -> usize {
        match self {
            StandardIntegrator::RK443 => RK443.order(),
            StandardIntegrator::RK222 => RK222.order(),
            StandardIntegrator::RK111 => RK111.order(),
        }
    }

    fn n_stages(&self) -> usize {
        match self {
            StandardIntegrator::RK443 => RK443.n_stages(),
            StandardIntegrator::RK222 => RK222.n_stages(),
            StandardIntegrator::RK111 => RK111.n_stages(),
        }
    }

    fn tableau(&self) -> Tableau {
        match self {
            StandardIntegrator::RK443 => RK443.tableau(),
            StandardIntegrator::RK222 => RK222.tableau(),
            StandardIntegrator::RK111 => RK111.tableau(),
        }
    }
}

/// Type alias for boxed integrator info (runtime polymorphism).
pub type BoxedIntegratorInfo = Box<dyn IntegratorInfo>;

/// Create a boxed integrator info from a standard integrator type.
pub fn create_integrator_info(integrator: StandardIntegrator) -> BoxedIntegratorInfo {
    match integrator {
        StandardIntegrator::RK443 => Box::new(RK443),
        StandardIntegrator::RK222 => Box::new(RK222),
        StandardIntegrator::RK111 => Box::new(RK111),
    }
}
