//! tissue-pipeline: CT tissue segmentation and denoiser comparison
//! (sans-IO).
//!
//! Takes a calibrated scalar field (one Hounsfield-like value per pixel)
//! and produces, for three denoising strategies, a denoised 8-bit image,
//! disjoint fat / muscle / bone masks and a colorized overlay, plus
//! per-tissue statistics.
//!
//! This crate does no I/O beyond reading a residual model file in
//! [`ResidualDenoiser::load`]. Loading slices and writing images lives in
//! `tissue-bench`.
//!
//! ```
//! use tissue_pipeline::{PipelineConfig, ScalarField, compare};
//!
//! let field = ScalarField::from_fn(32, 32, |x, y| {
//!     if (8..24).contains(&x) && (8..24).contains(&y) { 50.0 } else { -1000.0 }
//! })?;
//! let result = compare(&field, &PipelineConfig::default(), None)?;
//! assert!(result.variants[0].masks.is_disjoint());
//! # Ok::<(), tissue_pipeline::PipelineError>(())
//! ```

pub mod blur;
pub mod canny;
pub mod compare;
pub mod denoise;
pub mod diagnostics;
pub mod morphology;
pub mod nlmeans;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod overlay;
pub mod residual;
pub mod segment;
pub mod stats;
pub mod technique;
pub mod types;
pub mod window;

pub use compare::{
    AdvancedSource, ComparisonResult, NlMeansBaseline, Variant, VariantResult, compare,
    compare_with_diagnostics,
};
pub use denoise::{ClassicalDenoiser, DenoiseConfig};
pub use overlay::{BlendMode, OverlayConfig, render};
pub use residual::{DenoiseError, ModelLoadError, NoiseModel, ResidualDenoiser};
pub use segment::{Segmentation, SegmentationConfig, TissueSegmenter, resolve_priority, segment};
pub use stats::{SliceStatistics, TissueStats, compute_stats};
pub use technique::{TechniqueConfig, TechniqueGallery};
pub use types::{
    BinaryMask, ColorImage, Dimensions, PipelineConfig, PipelineError, ScalarField, TissueClass,
    TissueMaskSet, VisualizationImage,
};
pub use window::Window;
