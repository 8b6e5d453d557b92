//! Pointwise comparison of grid data.

/// Error statistics of a computed array against a reference.
#[derive(Clone, Copy, Debug)]
pub struct ComparisonMetrics {
    /// Root mean square error: sqrt(mean((computed - reference)²))
    pub rmse: f64,
    /// Maximum absolute error
    pub max_error: f64,
    /// Largest absolute reference value, for relative thresholds
    pub reference_scale: f64,
    pub n_points: usize,
}

impl ComparisonMetrics {
    /// Compare two arrays of equal, non-zero length; `None` otherwise.
    pub fn compute(computed: &[f64], reference: &[f64]) -> Option<Self> {
        if computed.len() != reference.len() || computed.is_empty() {
            return None;
        }
        let n = computed.len();
        let (sq, max_error) = computed
            .iter()
            .zip(reference)
            .map(|(c, r)| (c - r).abs())
            .fold((0.0, 0.0f64), |(sq, mx), e| (sq + e * e, mx.max(e)));
        let reference_scale = reference.iter().fold(0.0f64, |m, r| m.max(r.abs()));
        Some(Self {
            rmse: (sq / n as f64).sqrt(),
            max_error,
            reference_scale,
            n_points: n,
        })
    }

    /// Maximum error relative to the reference magnitude.
    pub fn relative_max_error(&self) -> f64 {
        if self.reference_scale > 0.0 {
            self.max_error / self.reference_scale
        } else {
            self.max_error
        }
    }
}
