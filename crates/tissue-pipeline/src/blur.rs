//! Gaussian smoothing for visualization images and scalar fields.
//!
//! [`gaussian_blur`] wraps [`imageproc::filter::gaussian_blur_f32`] for the
//! 8-bit visualization image; it is the "classical" denoiser.
//!
//! [`gaussian_blur_field`] smooths calibrated data with a fixed odd-sized
//! kernel (3x3 by default) through `imageproc`'s separable filter. The
//! scalar field is never quantized, so small sigmas smooth noise without
//! shifting tissue values across band boundaries.

use crate::types::{FloatImage, PipelineError, ScalarField, VisualizationImage};

/// Smooth a windowed slice.
///
/// `imageproc` panics on `sigma <= 0.0`, so a non-positive or NaN sigma
/// yields a copy of the input.
#[must_use = "returns the smoothed slice"]
pub fn gaussian_blur(slice: &VisualizationImage, sigma: f32) -> VisualizationImage {
    if sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(slice, sigma)
    } else {
        slice.clone()
    }
}

/// Normalized 1-D Gaussian weights of length `size` (odd).
fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let half = i64::from(size / 2);
    let two_sigma_sq = 2.0 * sigma * sigma;
    #[allow(clippy::cast_precision_loss)]
    let weights: Vec<f32> = (-half..=half)
        .map(|i| {
            let d = i as f32;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Smooth a scalar field with a separable `kernel_size x kernel_size`
/// Gaussian. Borders are padded by repeating the edge value.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `kernel_size` is even or
/// zero, or if `sigma` is not positive and finite.
pub fn gaussian_blur_field(
    field: &ScalarField,
    kernel_size: u32,
    sigma: f32,
) -> Result<ScalarField, PipelineError> {
    validate_kernel(kernel_size, sigma)?;
    let kernel = gaussian_kernel(kernel_size, sigma);
    let smoothed: FloatImage = imageproc::filter::separable_filter_equal(field.as_image(), &kernel);
    Ok(ScalarField::from_filtered(smoothed))
}

pub(crate) fn validate_kernel(kernel_size: u32, sigma: f32) -> Result<(), PipelineError> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "gaussian kernel size must be odd, got {kernel_size}"
        )));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "gaussian sigma must be positive, got {sigma}"
        )));
    }
    Ok(())
}
