//! Run configuration.
//!
//! Every section has serde defaults, so a JSON file only needs the keys it
//! changes:
//!
//! ```json
//! { "physics": { "rayleigh": 1e6 }, "stop": { "stop_iteration": 200 } }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
use crate::domain::Domain;
use crate::equations::{HorizontalConvection, NoiseConfig, WallCondition};
use crate::error::{Result, SolverError};
use crate::parallel::Communicator;
use crate::solver::{CflConfig, StopConditions};
use crate::time::StandardIntegrator;

/// Box size and resolution. `ly`/`ny` are only used by 3D runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub lx: f64,
    pub ly: f64,
    pub lz: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dealias: f64,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            lx: 4.0,
            ly: 1.0,
            lz: 1.0,
            nx: 1024,
            ny: 64,
            nz: 256,
            dealias: 1.5,
        }
    }
}

impl DomainConfig {
    /// Build the domain for a 2D (`x, z`) or 3D (`x, y, z`) run.
    pub fn build(&self, dim: usize, comm: Arc<dyn Communicator>) -> Result<Domain> {
        let mut bases: Vec<Basis> = vec![
            FourierBasis::with_dealias("x", self.nx, (0.0, self.lx), self.dealias)?.into(),
        ];
        match dim {
            2 => {}
            3 => bases.push(
                FourierBasis::with_dealias("y", self.ny, (0.0, self.ly), self.dealias)?.into(),
            ),
            _ => {
                return Err(SolverError::configuration(format!(
                    "runs are 2D or 3D, got {}",
                    dim
                )));
            }
        }
        bases.push(ChebyshevBasis::with_dealias("z", self.nz, (0.0, self.lz), self.dealias)?.into());
        Domain::new(bases, comm)
    }
}

/// Physical parameters and initial state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub rayleigh: f64,
    pub prandtl: f64,
    pub walls: WallCondition,
    /// Uniform initial interior buoyancy.
    pub initial_buoyancy: f64,
    pub noise: Option<NoiseConfig>,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            rayleigh: 1e9,
            prandtl: 1.0,
            walls: WallCondition::NoSlip,
            initial_buoyancy: -0.6,
            noise: None,
        }
    }
}

impl PhysicsConfig {
    pub fn model(&self) -> HorizontalConvection {
        HorizontalConvection::new(self.rayleigh, self.prandtl).with_walls(self.walls)
    }
}

/// Snapshot and diagnostics streams.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Simulation time between snapshots; `None` disables them.
    pub snapshot_dt: Option<f64>,
    pub snapshot_max_writes: usize,
    /// Iterations between scalar diagnostics; `None` disables them.
    pub diagnostics_iter: Option<u64>,
    pub diagnostics_max_writes: usize,
    /// Simulation time between y-averaged fields of 3D runs.
    pub averages_dt: Option<f64>,
    pub averages_max_writes: usize,
    /// Iterations between flow-property log lines.
    pub log_cadence: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            snapshot_dt: Some(2.0),
            snapshot_max_writes: 200,
            diagnostics_iter: Some(10),
            diagnostics_max_writes: 10_000,
            averages_dt: Some(0.25),
            averages_max_writes: 50,
            log_cadence: 10,
        }
    }
}

/// Complete configuration of a horizontal convection run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub dim: usize,
    pub domain: DomainConfig,
    pub physics: PhysicsConfig,
    pub integrator: StandardIntegrator,
    pub cfl: CflConfig,
    pub stop: StopConditions,
    pub output: OutputConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dim: 2,
            domain: DomainConfig::default(),
            physics: PhysicsConfig::default(),
            integrator: StandardIntegrator::RK443,
            cfl: CflConfig::default(),
            stop: StopConditions::default().with_sim_time(18000.0),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// The 3D box: 4 x 1 x 1 at 256 x 64 x 64, Ra = 1e7, started from
    /// rest at b = 0.
    pub fn three_dimensional() -> Self {
        Self {
            dim: 3,
            domain: DomainConfig {
                nx: 256,
                ny: 64,
                nz: 64,
                ..DomainConfig::default()
            },
            physics: PhysicsConfig {
                rayleigh: 1e7,
                initial_buoyancy: 0.0,
                ..PhysicsConfig::default()
            },
            cfl: CflConfig::default().with_cadence(4),
            stop: StopConditions::default().with_sim_time(2500.0),
            output: OutputConfig {
                snapshot_dt: Some(25.0),
                snapshot_max_writes: 20,
                ..OutputConfig::default()
            },
            ..Self::default()
        }
    }

    /// Defaults for `dim`, 2 or 3.
    pub fn for_dim(dim: usize) -> Result<Self> {
        match dim {
            2 => Ok(Self::default()),
            3 => Ok(Self::three_dimensional()),
            _ => Err(SolverError::configuration(format!(
                "runs are 2D or 3D, got {}",
                dim
            ))),
        }
    }

    /// Load a JSON file; keys missing from it keep the 2D defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SolverError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| SolverError::configuration(format!("invalid run configuration: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SolverError::configuration(format!("cannot serialize: {}", e)))
    }

    pub fn with_resolution(mut self, nx: usize, nz: usize) -> Self {
        self.domain.nx = nx;
        self.domain.nz = nz;
        self
    }

    pub fn with_rayleigh(mut self, rayleigh: f64) -> Self {
        self.physics.rayleigh = rayleigh;
        self
    }

    pub fn with_walls(mut self, walls: WallCondition) -> Self {
        self.physics.walls = walls;
        self
    }

    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.physics.noise = Some(noise);
        self
    }

    pub fn with_cfl(mut self, cfl: CflConfig) -> Self {
        self.cfl = cfl;
        self
    }

    pub fn with_stop(mut self, stop: StopConditions) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    /// Check settings that can be rejected before any worker starts.
    pub fn validate(&self) -> Result<()> {
        if self.dim != 2 && self.dim != 3 {
            return Err(SolverError::configuration(format!(
                "runs are 2D or 3D, got {}",
                self.dim
            )));
        }
        let d = &self.domain;
        if !(d.lx > 0.0 && d.lz > 0.0 && (self.dim == 2 || d.ly > 0.0)) {
            return Err(SolverError::configuration("box lengths must be positive"));
        }
        for (name, dt) in [
            ("snapshot_dt", self.output.snapshot_dt),
            ("averages_dt", self.output.averages_dt),
        ] {
            if let Some(dt) = dt
                && !(dt > 0.0)
            {
                return Err(SolverError::configuration(format!("{} must be positive", name)));
            }
        }
        if self.output.diagnostics_iter == Some(0) || self.output.log_cadence == 0 {
            return Err(SolverError::configuration("iteration cadences must be positive"));
        }
        Ok(())
    }
}
