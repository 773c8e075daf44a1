//! Classical denoisers for the 8-bit visualization image, plus the
//! scalar-field smoothing that accompanies each comparison variant.

use serde::{Deserialize, Serialize};

use crate::blur;
use crate::nlmeans;
use crate::types::{PipelineError, VisualizationImage};

/// Filter parameters shared by the comparison variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Gaussian sigma for the classical visualization denoiser.
    pub classical_sigma: f32,
    /// Non-local means filter strength `h`.
    pub nlm_strength: f32,
    /// Non-local means patch radius (7x7 patch at 3).
    pub nlm_patch_radius: u32,
    /// Non-local means search radius (21x21 window at 10).
    pub nlm_search_radius: u32,
    /// Side of the square kernel used to smooth scalar fields.
    pub field_kernel_size: u32,
    /// Scalar-field sigma for the classical variant.
    pub classical_field_sigma: f32,
    /// Scalar-field sigma for the advanced variant.
    pub advanced_field_sigma: f32,
}

impl DenoiseConfig {
    /// Default classical sigma.
    pub const DEFAULT_CLASSICAL_SIGMA: f32 = 1.0;
    /// Default non-local means strength.
    pub const DEFAULT_NLM_STRENGTH: f32 = 10.0;

    /// The non-local means filter described by this config.
    #[must_use]
    pub const fn non_local_means(&self) -> ClassicalDenoiser {
        ClassicalDenoiser::NonLocalMeans {
            strength: self.nlm_strength,
            patch_radius: self.nlm_patch_radius,
            search_radius: self.nlm_search_radius,
        }
    }

    /// The Gaussian filter described by this config.
    #[must_use]
    pub const fn gaussian(&self) -> ClassicalDenoiser {
        ClassicalDenoiser::Gaussian {
            sigma: self.classical_sigma,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if !(self.classical_sigma.is_finite() && self.classical_sigma >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "classical_sigma must be non-negative, got {}",
                self.classical_sigma
            )));
        }
        if !(self.nlm_strength.is_finite() && self.nlm_strength > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "nlm_strength must be positive, got {}",
                self.nlm_strength
            )));
        }
        blur::validate_kernel(self.field_kernel_size, self.classical_field_sigma)?;
        blur::validate_kernel(self.field_kernel_size, self.advanced_field_sigma)
    }
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            classical_sigma: Self::DEFAULT_CLASSICAL_SIGMA,
            nlm_strength: Self::DEFAULT_NLM_STRENGTH,
            nlm_patch_radius: 3,
            nlm_search_radius: 10,
            field_kernel_size: 3,
            classical_field_sigma: 0.8,
            advanced_field_sigma: 1.0,
        }
    }
}

/// A filter that needs no learned weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassicalDenoiser {
    /// Isotropic Gaussian blur.
    Gaussian {
        /// Standard deviation in pixels.
        sigma: f32,
    },
    /// Patch-similarity weighted averaging.
    NonLocalMeans {
        /// Filter strength `h`.
        strength: f32,
        /// Patch radius in pixels.
        patch_radius: u32,
        /// Search window radius in pixels.
        search_radius: u32,
    },
}

impl ClassicalDenoiser {
    /// Apply the filter. Output has the same dimensions as `image`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if `image` has zero area.
    pub fn denoise(&self, image: &VisualizationImage) -> Result<VisualizationImage, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidInput(
                "cannot denoise an empty image".to_string(),
            ));
        }
        match *self {
            Self::Gaussian { sigma } => Ok(blur::gaussian_blur(image, sigma)),
            Self::NonLocalMeans {
                strength,
                patch_radius,
                search_radius,
            } => nlmeans::non_local_means(image, strength, patch_radius, search_radius),
        }
    }
}
