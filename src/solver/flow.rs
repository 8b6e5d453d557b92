//! Run-health reductions logged alongside the integration.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::Domain;
use crate::equations::Expr;
use crate::error::Result;
use crate::evaluate::{GridEvaluator, Value};
use crate::field::Field;
use crate::types::GridScale;

/// Extremes and volume average of one property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertySummary {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

/// Named expressions reduced over the whole domain every `cadence`
/// iterations, independent of any snapshot output.
pub struct FlowProperties {
    domain: Arc<Domain>,
    cadence: u64,
    properties: Vec<(String, Expr)>,
    latest: BTreeMap<String, PropertySummary>,
}

impl FlowProperties {
    pub fn new(domain: Arc<Domain>, cadence: u64) -> Self {
        Self {
            domain,
            cadence: cadence.max(1),
            properties: Vec::new(),
            latest: BTreeMap::new(),
        }
    }

    pub fn add_property(&mut self, name: impl Into<String>, expr: Expr) {
        self.properties.push((name.into(), expr));
    }

    pub fn due(&self, iteration: u64) -> bool {
        iteration % self.cadence == 0
    }

    /// Recompute every property (collective).
    pub fn update(&mut self, fields: &[Field], parameters: &BTreeMap<String, f64>) -> Result<()> {
        let volume = self.domain.volume();
        let comm = Arc::clone(self.domain.comm());
        let mut ev = GridEvaluator::new(Arc::clone(&self.domain), fields, parameters, GridScale::Dealias);
        for (name, expr) in &self.properties {
            let summary = match ev.evaluate(expr)? {
                Value::Scalar(v) => PropertySummary {
                    max: v,
                    min: v,
                    mean: v,
                },
                Value::Grid(g) => {
                    let local_max = g.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let local_min = g.iter().copied().fold(f64::INFINITY, f64::min);
                    let coeffs = self.domain.forward(&g, GridScale::Dealias)?;
                    PropertySummary {
                        max: comm.all_reduce_max(local_max)?,
                        min: comm.all_reduce_min(local_min)?,
                        mean: self.domain.integrate_coefficients(&coeffs)? / volume,
                    }
                }
            };
            self.latest.insert(name.clone(), summary);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PropertySummary> {
        self.latest.get(name).copied()
    }

    pub fn max(&self, name: &str) -> Option<f64> {
        self.get(name).map(|s| s.max)
    }

    pub fn volume_average(&self, name: &str) -> Option<f64> {
        self.get(name).map(|s| s.mean)
    }
}
