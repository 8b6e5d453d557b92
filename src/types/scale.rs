//! Grid scale selector.

/// Which physical grid a grid-space representation lives on.
///
/// Every basis allocates `ceil(N * scale)` points, where the scale is 1 for
/// the base grid and the basis' dealiasing factor for the padded grid used
/// to evaluate nonlinear products.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GridScale {
    #[default]
    Unit,
    Dealias,
}

impl GridScale {
    /// Numerical scale factor given a basis' dealiasing factor.
    pub fn factor(self, dealias: f64) -> f64 {
        match self {
            GridScale::Unit => 1.0,
            GridScale::Dealias => dealias,
        }
    }
}
