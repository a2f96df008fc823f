//! Geometry analysis shared by the translation handlers.
//!
//! - [`smooth`]: pressure-weighted smoothing of raw samples
//! - [`simplify`]: Douglas–Peucker point reduction
//! - [`features`]: turning-angle features and pattern classification
//! - [`fit`]: residuals between a source path and its translation
//! - [`script`]: the procedural script dialect emitted for code mode

pub mod features;
pub mod fit;
pub mod script;
pub mod simplify;
pub mod smooth;

pub use features::{
    classify, extract, extract_simplified, reversal_rate, FeatureThresholds, StrokeFeatures,
};
pub use fit::{fit_quality, mean_residual};
pub use script::Script;
pub use simplify::{simplify, simplify_indices};
pub use smooth::smooth_by_pressure;
