//! Strongly-typed domain types for safer APIs.
//!
//! This module provides newtypes and small enums that keep axis numbers,
//! variable slots and boundary sides from being mixed up.
//!
//! # Example
//!
//! ```
//! use hc_rs::types::{AxisIndex, GridScale, Side};
//!
//! let z = AxisIndex::new(1);
//! assert_eq!(z.get(), 1);
//! assert_eq!(Side::Left.opposite(), Side::Right);
//! assert_eq!(GridScale::Dealias.factor(1.5), 1.5);
//! ```

mod indices;
mod scale;
mod sides;

pub use indices::{AxisIndex, ModeIndex, VariableIndex};
pub use scale::GridScale;
pub use sides::Side;
