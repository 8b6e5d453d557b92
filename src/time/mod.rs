//! Time integration schemes.

mod integrator;

pub use integrator::{
    BoxedIntegratorInfo, IntegratorInfo, RK111, RK222, RK443, StandardIntegrator, Tableau,
    create_integrator_info,
};
