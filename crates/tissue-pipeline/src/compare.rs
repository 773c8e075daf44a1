//! Side-by-side comparison of three denoising strategies on one slice.
//!
//! For each variant the pipeline produces a denoised visualization image
//! and a matching smoothed scalar field, segments the field, and paints
//! the masks over the image:
//!
//! | Variant   | Visualization               | Scalar field               |
//! |-----------|-----------------------------|----------------------------|
//! | Raw       | windowed field              | unchanged                  |
//! | Classical | Gaussian blur               | Gaussian, classical sigma  |
//! | Advanced  | residual model or NL-means  | Gaussian, advanced sigma   |
//!
//! The advanced field is a generic smoothing proxy; it is not derived
//! from whichever denoiser produced the advanced visualization.
//!
//! Statistics are computed once, from the raw field under the raw masks.
//! A missing or failing residual model never fails the comparison: the
//! advanced variant silently switches to non-local means and
//! [`ComparisonResult::advanced_source`] records the substitution. When the
//! model does run, non-local means is still produced as a separate
//! baseline, painted with the classical masks.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::blur::gaussian_blur_field;
use crate::denoise::DenoiseConfig;
use crate::diagnostics::{Clock, ComparisonDiagnostics, NullClock, VariantDiagnostics};
use crate::overlay;
use crate::residual::ResidualDenoiser;
use crate::segment::TissueSegmenter;
use crate::stats::SliceStatistics;
use crate::types::{
    ColorImage, PipelineConfig, PipelineError, ScalarField, TissueMaskSet, VisualizationImage,
};

/// One of the three compared denoising strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// No denoising.
    Raw,
    /// Linear Gaussian smoothing.
    Classical,
    /// Learned residual denoising, or non-local means as a fallback.
    Advanced,
}

impl Variant {
    /// All variants in comparison order.
    pub const ALL: [Self; 3] = [Self::Raw, Self::Classical, Self::Advanced];

    /// Lower-case label for file names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Classical => "classical",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("Raw"),
            Self::Classical => f.write_str("Classical"),
            Self::Advanced => f.write_str("Advanced"),
        }
    }
}

/// Which denoiser produced the advanced visualization image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvancedSource {
    /// The residual model ran successfully.
    ResidualModel,
    /// No model was available or inference failed.
    NonLocalMeans,
}

impl fmt::Display for AdvancedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResidualModel => f.write_str("residual model"),
            Self::NonLocalMeans => f.write_str("NL-means"),
        }
    }
}

/// Everything produced for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantResult {
    /// Which variant this is.
    pub variant: Variant,
    /// Denoised 8-bit image.
    pub visualization: VisualizationImage,
    /// Smoothed scalar field that was segmented.
    pub field: ScalarField,
    /// Disjoint tissue masks.
    pub masks: TissueMaskSet,
    /// Masks painted over `visualization`.
    pub overlay: ColorImage,
}

/// Non-local means output kept next to a residual-model advanced variant.
///
/// It has no scalar field of its own; the overlay uses the classical
/// variant's masks.
#[derive(Debug, Clone, PartialEq)]
pub struct NlMeansBaseline {
    /// Non-local means denoised 8-bit image.
    pub visualization: VisualizationImage,
    /// Classical masks painted over `visualization`.
    pub overlay: ColorImage,
}

/// Complete comparison for one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    /// Raw, classical and advanced, in that order.
    pub variants: [VariantResult; 3],
    /// Statistics of the raw field under the raw masks.
    pub statistics: SliceStatistics,
    /// Denoiser behind the advanced variant.
    pub advanced_source: AdvancedSource,
    /// Present only when `advanced_source` is
    /// [`AdvancedSource::ResidualModel`]; otherwise the advanced variant
    /// already is the non-local means result.
    pub nl_means_baseline: Option<NlMeansBaseline>,
}

impl ComparisonResult {
    /// Result for `variant`.
    #[must_use]
    pub const fn get(&self, variant: Variant) -> &VariantResult {
        match variant {
            Variant::Raw => &self.variants[0],
            Variant::Classical => &self.variants[1],
            Variant::Advanced => &self.variants[2],
        }
    }
}

/// Run the comparison.
///
/// `denoiser` is the residual model for the advanced variant; pass `None`
/// (e.g. from [`ResidualDenoiser::load_or_warn`]) to use non-local means.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` does not
/// validate. Model failures are never returned.
pub fn compare(
    field: &ScalarField,
    config: &PipelineConfig,
    denoiser: Option<&ResidualDenoiser>,
) -> Result<ComparisonResult, PipelineError> {
    compare_with_diagnostics(field, config, denoiser, &NullClock).map(|(result, _)| result)
}

/// Run the comparison and time every stage with `clock`.
///
/// # Errors
///
/// See [`compare`].
pub fn compare_with_diagnostics<C: Clock>(
    field: &ScalarField,
    config: &PipelineConfig,
    denoiser: Option<&ResidualDenoiser>,
    clock: &C,
) -> Result<(ComparisonResult, ComparisonDiagnostics), PipelineError> {
    config.validate()?;
    let run_start = clock.now();

    let start = clock.now();
    let visualization = config.window.apply(field);
    let windowing = clock.elapsed(&start);

    let segmenter = TissueSegmenter::new(config.segmentation.clone());
    let mut advanced_source = AdvancedSource::NonLocalMeans;
    let mut results = Vec::with_capacity(Variant::ALL.len());
    let mut timings = Vec::with_capacity(Variant::ALL.len());

    for variant in Variant::ALL {
        debug!("processing {variant} variant");

        let start = clock.now();
        let denoised = match variant {
            Variant::Raw => visualization.clone(),
            Variant::Classical => config.denoise.gaussian().denoise(&visualization)?,
            Variant::Advanced => {
                let (image, source) = denoise_advanced(&visualization, denoiser, &config.denoise)?;
                advanced_source = source;
                image
            }
        };
        let denoise = clock.elapsed(&start);

        let start = clock.now();
        let smoothed = smooth_field(field, variant, &config.denoise)?;
        let smoothing = clock.elapsed(&start);

        let start = clock.now();
        let masks = segmenter.segment(&smoothed)?;
        let segmentation = clock.elapsed(&start);

        let start = clock.now();
        let painted = overlay::render(&denoised, &masks, &config.overlay)?;
        let overlay_time = clock.elapsed(&start);

        timings.push(VariantDiagnostics {
            variant,
            denoise,
            smoothing,
            segmentation,
            overlay: overlay_time,
            fat_pixels: masks.fat.count(),
            muscle_pixels: masks.muscle.count(),
            bone_pixels: masks.bone.count(),
        });
        results.push(VariantResult {
            variant,
            visualization: denoised,
            field: smoothed,
            masks,
            overlay: painted,
        });
    }

    let [raw, classical, advanced]: [VariantResult; 3] = results
        .try_into()
        .map_err(|_| PipelineError::InvalidInput("variant count changed".to_string()))?;

    let start = clock.now();
    let nl_means_baseline = match advanced_source {
        AdvancedSource::ResidualModel => {
            let image = config.denoise.non_local_means().denoise(&visualization)?;
            let painted = overlay::render(&image, &classical.masks, &config.overlay)?;
            Some(NlMeansBaseline {
                visualization: image,
                overlay: painted,
            })
        }
        AdvancedSource::NonLocalMeans => None,
    };
    let baseline_time = nl_means_baseline.as_ref().map(|_| clock.elapsed(&start));

    let start = clock.now();
    let statistics = SliceStatistics::compute(field, &raw.masks)?;
    let statistics_time = clock.elapsed(&start);

    let diagnostics = ComparisonDiagnostics {
        width: field.width(),
        height: field.height(),
        windowing,
        variants: timings,
        statistics: statistics_time,
        advanced_source,
        nl_means_baseline: baseline_time,
        total_duration: clock.elapsed(&run_start),
    };

    Ok((
        ComparisonResult {
            variants: [raw, classical, advanced],
            statistics,
            advanced_source,
            nl_means_baseline,
        },
        diagnostics,
    ))
}

/// Scalar field that `variant` segments.
fn smooth_field(
    field: &ScalarField,
    variant: Variant,
    config: &DenoiseConfig,
) -> Result<ScalarField, PipelineError> {
    match variant {
        Variant::Raw => Ok(field.clone()),
        Variant::Classical => {
            gaussian_blur_field(field, config.field_kernel_size, config.classical_field_sigma)
        }
        Variant::Advanced => {
            gaussian_blur_field(field, config.field_kernel_size, config.advanced_field_sigma)
        }
    }
}

/// Residual model output if it succeeds, non-local means otherwise.
fn denoise_advanced(
    image: &VisualizationImage,
    denoiser: Option<&ResidualDenoiser>,
    config: &DenoiseConfig,
) -> Result<(VisualizationImage, AdvancedSource), PipelineError> {
    if let Some(model) = denoiser {
        match model.denoise(image) {
            Ok(clean) => return Ok((clean, AdvancedSource::ResidualModel)),
            Err(e) => warn!(
                "residual model {} failed: {e}; falling back to non-local means",
                model.model_name()
            ),
        }
    }
    let fallback = config.non_local_means().denoise(image)?;
    Ok((fallback, AdvancedSource::NonLocalMeans))
}
