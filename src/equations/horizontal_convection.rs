//! Boussinesq horizontal convection in first-order form.
//!
//! Nondimensionalized by the buoyancy time scale, with
//! P = (Ra Pr)^(-1/2) (diffusivity) and R = (Ra / Pr)^(-1/2) (viscosity).
//! The flow is forced only by the surface buoyancy `b(z = Lz) = cos(2 k x)`,
//! k = π / Lx; the bottom is insulating.
//!
//! The zero x mode swaps the top no-penetration condition for a pressure
//! gauge `p(z = Lz) = 0`, since continuity already pins w there.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Domain;
use crate::error::{Result, SolverError};
use crate::field::Field;
use crate::types::Side;

use super::expr::{Expr, constant, coord, cos, diff, dt, field, integrate, param, sqrt};
use super::problem::{ModeCondition, Problem, ProblemBuilder};

fn f(name: impl Into<String>) -> Expr {
    field(name)
}

/// Velocity condition on the top and bottom walls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallCondition {
    #[default]
    NoSlip,
    FreeSlip,
}

/// Physical parameters of a horizontal convection run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HorizontalConvection {
    pub rayleigh: f64,
    pub prandtl: f64,
    pub walls: WallCondition,
}

impl Default for HorizontalConvection {
    fn default() -> Self {
        Self {
            rayleigh: 1e9,
            prandtl: 1.0,
            walls: WallCondition::NoSlip,
        }
    }
}

impl HorizontalConvection {
    pub fn new(rayleigh: f64, prandtl: f64) -> Self {
        Self {
            rayleigh,
            prandtl,
            walls: WallCondition::NoSlip,
        }
    }

    pub fn with_walls(mut self, walls: WallCondition) -> Self {
        self.walls = walls;
        self
    }

    /// Buoyancy diffusivity P = (Ra Pr)^(-1/2).
    pub fn diffusivity(&self) -> f64 {
        (self.rayleigh * self.prandtl).powf(-0.5)
    }

    /// Kinematic viscosity R = (Ra / Pr)^(-1/2).
    pub fn viscosity(&self) -> f64 {
        (self.rayleigh / self.prandtl).powf(-0.5)
    }

    /// Forcing wavenumber k = π / Lx.
    pub fn forcing_wavenumber(domain: &Domain) -> f64 {
        std::f64::consts::PI / domain.basis(0).length()
    }

    fn check(&self) -> Result<()> {
        if !(self.rayleigh > 0.0 && self.prandtl > 0.0) {
            return Err(SolverError::configuration(format!(
                "Rayleigh and Prandtl numbers must be positive (Ra = {}, Pr = {})",
                self.rayleigh, self.prandtl
            )));
        }
        Ok(())
    }

    /// Names of the velocity components and their axes.
    pub fn velocity_names(dim: usize) -> &'static [(&'static str, &'static str)] {
        if dim == 3 {
            &[("u", "x"), ("v", "y"), ("w", "z")]
        } else {
            &[("u", "x"), ("w", "z")]
        }
    }

    /// Fields written to snapshots.
    pub fn snapshot_names(dim: usize) -> &'static [&'static str] {
        if dim == 3 {
            &["b", "u", "v", "w"]
        } else {
            &["b", "bz", "u", "w"]
        }
    }

    /// Fields averaged over y for the 3D `2d_averages` output.
    pub fn average_names() -> &'static [&'static str] {
        &["b", "bz", "u", "w"]
    }

    /// The 2D (x, z) or 3D (x, y, z) problem, by domain dimension.
    pub fn problem(&self, domain: Arc<Domain>) -> Result<Problem> {
        self.check()?;
        match domain.dim() {
            2 => self.problem_2d(domain),
            3 => self.problem_3d(domain),
            d => Err(SolverError::configuration(format!(
                "horizontal convection needs 2 or 3 axes, got {}",
                d
            ))),
        }
    }

    fn problem_2d(&self, domain: Arc<Domain>) -> Result<Problem> {
        let k = Self::forcing_wavenumber(&domain);
        let dx = |e: Expr| diff("x", e);
        let dz = |e: Expr| diff("z", e);
        let laplacian = |v: &str, vz: &str| dx(dx(f(v))) + dz(f(vz));
        let advection = |v: &str, vz: &str| -(f("u") * dx(f(v)) + f("w") * f(vz));

        let builder = ProblemBuilder::new(domain, &["p", "b", "u", "w", "bz", "uz", "wz", "bx"])
            .dirichlet(&["p", "b", "u", "w"])
            .parameter("P", self.diffusivity())
            .parameter("R", self.viscosity())
            .parameter("k", k)
            .declare_auxiliary("bz", dz(f("b")))
            .declare_auxiliary("bx", dx(f("b")))
            .declare_auxiliary("uz", dz(f("u")))
            .declare_auxiliary("wz", dz(f("w")))
            .equation(dx(f("u")) + f("wz"), constant(0.0))
            .equation(
                dt(f("b")) - param("P") * laplacian("b", "bz"),
                -(f("u") * f("bx") + f("w") * f("bz")),
            )
            .equation(
                dt(f("u")) - param("R") * laplacian("u", "uz") + dx(f("p")),
                advection("u", "uz"),
            )
            .equation(
                dt(f("w")) - param("R") * laplacian("w", "wz") + dz(f("p")) - f("b"),
                advection("w", "wz"),
            )
            .equation(f("bz") - dz(f("b")), constant(0.0))
            .equation(f("bx") - dx(f("b")), constant(0.0))
            .equation(f("uz") - dz(f("u")), constant(0.0))
            .equation(f("wz") - dz(f("w")), constant(0.0));

        self.boundaries(builder, &["u"]).build()
    }

    fn problem_3d(&self, domain: Arc<Domain>) -> Result<Problem> {
        let k = Self::forcing_wavenumber(&domain);
        let dx = |e: Expr| diff("x", e);
        let dy = |e: Expr| diff("y", e);
        let dz = |e: Expr| diff("z", e);
        let laplacian = |v: &str, vz: &str| dx(dx(f(v))) + dy(dy(f(v))) + dz(f(vz));
        let advection = |v: &str, vz: &str| {
            -(f("u") * dx(f(v)) + f("v") * dy(f(v)) + f("w") * f(vz))
        };

        let builder = ProblemBuilder::new(
            domain,
            &["p", "b", "u", "v", "w", "bz", "uz", "vz", "wz", "bx", "by"],
        )
        .dirichlet(&["p", "b", "u", "v", "w"])
        .parameter("P", self.diffusivity())
        .parameter("R", self.viscosity())
        .parameter("k", k)
        .declare_auxiliary("bx", dx(f("b")))
        .declare_auxiliary("by", dy(f("b")))
        .declare_auxiliary("bz", dz(f("b")))
        .declare_auxiliary("uz", dz(f("u")))
        .declare_auxiliary("vz", dz(f("v")))
        .declare_auxiliary("wz", dz(f("w")))
        .equation(dx(f("u")) + dy(f("v")) + f("wz"), constant(0.0))
        .equation(
            dt(f("b")) - param("P") * laplacian("b", "bz"),
            -(f("u") * f("bx") + f("v") * f("by") + f("w") * f("bz")),
        )
        .equation(
            dt(f("u")) - param("R") * laplacian("u", "uz") + dx(f("p")),
            advection("u", "uz"),
        )
        .equation(
            dt(f("v")) - param("R") * laplacian("v", "vz") + dy(f("p")),
            advection("v", "vz"),
        )
        .equation(
            dt(f("w")) - param("R") * laplacian("w", "wz") + dz(f("p")) - f("b"),
            advection("w", "wz"),
        )
        .equation(f("bx") - dx(f("b")), constant(0.0))
        .equation(f("by") - dy(f("b")), constant(0.0))
        .equation(f("bz") - dz(f("b")), constant(0.0))
        .equation(f("uz") - dz(f("u")), constant(0.0))
        .equation(f("wz") - dz(f("w")), constant(0.0))
        .equation(f("vz") - dz(f("v")), constant(0.0));

        self.boundaries(builder, &["u", "v"]).build()
    }

    /// Wall conditions shared by both geometries. `horizontal` lists the
    /// horizontal velocity components.
    fn boundaries(&self, mut builder: ProblemBuilder, horizontal: &[&str]) -> ProblemBuilder {
        let zero = || constant(0.0);
        builder = builder.boundary(Side::Left, field("bz"), zero(), ModeCondition::Always);
        for side in [Side::Left, Side::Right] {
            for &h in horizontal {
                let target = match self.walls {
                    WallCondition::NoSlip => field(h),
                    WallCondition::FreeSlip => field(format!("{}z", h)),
                };
                builder = builder.boundary(side, target, zero(), ModeCondition::Always);
            }
        }
        builder
            .boundary(Side::Left, field("w"), zero(), ModeCondition::Always)
            .boundary(
                Side::Right,
                field("b"),
                cos(2.0 * param("k") * coord("x")),
                ModeCondition::Always,
            )
            .boundary(
                Side::Right,
                field("w"),
                zero(),
                ModeCondition::mode_not_equals("x", 0),
            )
            .boundary(
                Side::Right,
                field("p"),
                zero(),
                ModeCondition::mode_equals("x", 0),
            )
    }

    /// Volume-averaged energetics written by the diagnostics handler:
    /// kinetic energy, buoyancy variance dissipation χ, viscous dissipation
    /// ε and buoyancy flux ⟨w b⟩.
    pub fn diagnostic_tasks(domain: &Domain) -> Vec<(String, Expr)> {
        let volume = domain.volume();
        let sq = |e: Expr| e.clone() * e;
        let velocities = Self::velocity_names(domain.dim());
        let periodic: Vec<&str> = velocities
            .iter()
            .map(|&(_, axis)| axis)
            .filter(|&a| a != "z")
            .collect();

        let ke = velocities
            .iter()
            .map(|&(v, _)| sq(f(v)))
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| constant(0.0));
        let chi = periodic
            .iter()
            .map(|a| sq(f(format!("b{}", a))))
            .fold(sq(f("bz")), |a, b| a + b);
        let ep = velocities
            .iter()
            .map(|&(v, _)| {
                periodic
                    .iter()
                    .map(|&a| sq(diff(a, f(v))))
                    .fold(sq(f(format!("{}z", v))), |acc, t| acc + t)
            })
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| constant(0.0));

        let mut tasks = vec![
            ("ke".to_string(), integrate(0.5 * ke) / volume),
            ("chi".to_string(), integrate(param("P") * chi) / volume),
            ("ep".to_string(), integrate(param("R") * ep) / volume),
            ("wb".to_string(), integrate(f("w") * f("b")) / volume),
        ];
        if domain.dim() == 3 {
            // Per-component splits of ke and chi.
            for &(v, _) in velocities {
                tasks.push((format!("{}2", v), integrate(0.5 * sq(f(v))) / volume));
            }
            for a in ["x", "y", "z"] {
                let grad = f(format!("b{}", a));
                tasks.push((format!("b{}2", a), integrate(param("P") * sq(grad)) / volume));
            }
        }
        tasks
    }

    /// Run-health monitors: Reynolds number `|u| / R` and kinetic energy
    /// density.
    pub fn flow_properties(&self, dim: usize) -> Vec<(String, Expr)> {
        let speed2 = Self::velocity_names(dim)
            .iter()
            .map(|&(v, _)| field(v) * field(v))
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| constant(0.0));
        vec![
            ("Re".to_string(), sqrt(speed2.clone()) / self.viscosity()),
            ("K".to_string(), speed2 / 2.0),
        ]
    }

    /// Uniform buoyancy `background`, optionally perturbed by seeded noise
    /// that vanishes on both walls.
    ///
    /// The noise is drawn over the global grid and each worker keeps its own
    /// block, so the initial state does not depend on the worker count.
    pub fn initial_buoyancy(
        &self,
        b: &mut Field,
        background: f64,
        noise: Option<NoiseConfig>,
    ) -> Result<()> {
        let domain = Arc::clone(b.domain());
        let scale = b.scale();
        let shape = domain.global_grid_shape(scale);
        let mut values = vec![background; shape.iter().product()];
        if let Some(noise) = noise {
            let z = domain.global_grid(domain.z_axis(), scale);
            let (z0, z1) = domain.basis(domain.z_axis()).interval();
            let half = 0.25 * (z1 - z0) * (z1 - z0);
            let mut rng = StdRng::seed_from_u64(noise.seed);
            for (i, v) in values.iter_mut().enumerate() {
                let zi = z[i % z.len()];
                let taper = (zi - z0) * (z1 - zi) / half;
                *v += noise.amplitude * taper * rng.gen_range(-1.0..1.0);
            }
        }
        b.set_grid_values(domain.local_block(&values, scale)?)?;
        b.to_coefficient()
    }

    /// Set `b` as in [`initial_buoyancy`](Self::initial_buoyancy) and its
    /// auxiliary gradients `bz`, `bx` (and `by` in 3D) to match (collective).
    pub fn initial_state(
        &self,
        fields: &mut [Field],
        background: f64,
        noise: Option<NoiseConfig>,
    ) -> Result<()> {
        let b = find_field(fields, "b")?;
        self.initial_buoyancy(b, background, noise)?;
        let b = find_field(fields, "b")?.clone();
        let domain = Arc::clone(b.domain());
        for axis in 0..domain.dim() {
            let name = format!("b{}", domain.basis(axis).name());
            let Some(target) = fields.iter_mut().find(|f| f.name() == name) else {
                continue;
            };
            let gradient = b.differentiate(axis)?;
            target.set_coefficient_values(gradient.coefficients()?.to_vec())?;
        }
        Ok(())
    }
}

fn find_field<'a>(fields: &'a mut [Field], name: &str) -> Result<&'a mut Field> {
    fields
        .iter_mut()
        .find(|f| f.name() == name)
        .ok_or_else(|| SolverError::configuration(format!("no field named '{}'", name)))
}

/// Seeded random perturbation of the initial state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub amplitude: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::{Basis, ChebyshevBasis, FourierBasis};
    use crate::equations::ProblemKind;
    use crate::parallel::SerialCommunicator;

    fn domain_2d(nx: usize, nz: usize) -> Arc<Domain> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", nx, (0.0, 2.0)).unwrap().into(),
            ChebyshevBasis::new("z", nz, (0.0, 1.0)).unwrap().into(),
        ];
        Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
    }

    fn domain_3d() -> Arc<Domain> {
        let bases: Vec<Basis> = vec![
            FourierBasis::new("x", 8, (0.0, 4.0)).unwrap().into(),
            FourierBasis::new("y", 4, (0.0, 1.0)).unwrap().into(),
            ChebyshevBasis::new("z", 8, (0.0, 1.0)).unwrap().into(),
        ];
        Arc::new(Domain::new(bases, Arc::new(SerialCommunicator::new())).unwrap())
    }

    #[test]
    fn test_coefficients() {
        let hc = HorizontalConvection::new(1e8, 4.0);
        assert!((hc.diffusivity() - 5e-5).abs() < 1e-15);
        assert!((hc.viscosity() - 2e-4).abs() < 1e-15);
        let k = HorizontalConvection::forcing_wavenumber(&domain_2d(8, 8));
        assert!((k - std::f64::consts::FRAC_PI_2).abs() < 1e-15);
    }

    #[test]
    fn test_2d_problem_builds() {
        let problem = HorizontalConvection::default()
            .problem(domain_2d(16, 8))
            .unwrap();
        assert_eq!(problem.kind, ProblemKind::InitialValue);
        assert_eq!(problem.variables.len(), 8);
        assert_eq!(problem.boundaries.len(), 6);
        let dirichlet: Vec<&str> = problem
            .variables
            .iter()
            .zip(&problem.dirichlet)
            .filter(|(_, d)| **d)
            .map(|(v, _)| v.as_str())
            .collect();
        assert_eq!(dirichlet, ["p", "b", "u", "w"]);
    }

    #[test]
    fn test_free_slip_and_3d_build() {
        HorizontalConvection::default()
            .with_walls(WallCondition::FreeSlip)
            .problem(domain_2d(8, 8))
            .unwrap();
        let problem = HorizontalConvection::default().problem(domain_3d()).unwrap();
        assert_eq!(problem.variables.len(), 11);
        assert_eq!(problem.boundaries.len(), 8);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let err = HorizontalConvection::new(-1.0, 1.0)
            .problem(domain_2d(8, 8))
            .unwrap_err();
        assert!(matches!(err, SolverError::Configuration(_)));
    }

    #[test]
    fn test_diagnostics_cover_2d_and_3d() {
        let names: Vec<String> = HorizontalConvection::diagnostic_tasks(&domain_2d(8, 8))
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["ke", "chi", "ep", "wb"]);
        let tasks = HorizontalConvection::diagnostic_tasks(&domain_3d());
        let chi = tasks[1].1.to_string();
        assert!(chi.contains("by") && chi.contains("bx"));
    }

    #[test]
    fn test_noise_is_seeded_and_bounded() {
        let hc = HorizontalConvection::default();
        let domain = domain_2d(8, 16);
        let mut b = Field::new(Arc::clone(&domain), "b");
        let noise = NoiseConfig {
            amplitude: 1e-2,
            seed: 42,
        };
        hc.initial_buoyancy(&mut b, -0.6, Some(noise)).unwrap();
        let mut again = Field::new(Arc::clone(&domain), "b");
        hc.initial_buoyancy(&mut again, -0.6, Some(noise)).unwrap();
        assert_eq!(b.grid().unwrap(), again.grid().unwrap());
        for v in b.grid().unwrap() {
            assert!((v + 0.6).abs() <= 1e-2);
        }
    }

    #[test]
    fn test_initial_state_sets_buoyancy_gradients() {
        let hc = HorizontalConvection::default();
        let problem = hc.problem(domain_2d(16, 12)).unwrap();
        let mut fields = problem.new_fields();
        let noise = NoiseConfig {
            amplitude: 1e-2,
            seed: 7,
        };
        hc.initial_state(&mut fields, -0.6, Some(noise)).unwrap();

        let get = |name: &str| fields.iter().find(|f| f.name() == name).unwrap();
        let b = get("b");
        for (axis, name) in [(0, "bx"), (1, "bz")] {
            let expected = b.differentiate(axis).unwrap();
            let gradient = get(name).coefficients().unwrap();
            assert_eq!(gradient, expected.coefficients().unwrap(), "{}", name);
        }
        // The tapered noise has a vertical gradient.
        assert!(get("bz").coefficients().unwrap().iter().any(|c| c.abs() > 1e-6));
        assert!(hc.initial_state(&mut [], 0.0, None).is_err());
    }
}
