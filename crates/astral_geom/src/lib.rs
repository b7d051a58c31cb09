//! Cached transformation state and clip-window geometry shared across the
//! renderer crate.

mod clip;
mod transformation;

pub use clip::{ClipGeometry, ClipGeometryGroup};
pub use transformation::{CachedTransformation, Matrix2x2, MatrixType, Transformation};
