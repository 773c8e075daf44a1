//! Windowing: map calibrated intensities onto the 8-bit display range.
//!
//! A window is a level (center) and a width. Values at or below
//! `center - width / 2` map to 0, values at or above `center + width / 2`
//! map to 255, and values in between map linearly.
//!
//! This is the first step of the comparison pipeline: the windowed image
//! is what the denoisers operate on and what the overlays are painted on.

use image::Luma;
use serde::{Deserialize, Serialize};

use crate::types::{GrayImage, PipelineError, ScalarField, VisualizationImage};

/// Display window over calibrated intensities.
///
/// The pair is read as level / width, never as bounds: the default
/// `(40, 400)` shows `[-160, 240]`. Callers holding a `(low, high)` pair
/// such as `(40, 400)` meant as bounds must go through
/// [`Window::from_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Window level: the intensity mapped to mid-gray.
    pub center: f32,
    /// Window width: the intensity span mapped onto 0..=255.
    pub width: f32,
}

impl Window {
    /// Default window level (soft tissue).
    pub const DEFAULT_CENTER: f32 = 40.0;
    /// Default window width (soft tissue).
    pub const DEFAULT_WIDTH: f32 = 400.0;

    /// Create a window from level and width. For bounds use
    /// [`Window::from_bounds`].
    #[must_use]
    pub const fn new(center: f32, width: f32) -> Self {
        Self { center, width }
    }

    /// Create a window covering the closed interval `[low, high]`.
    #[must_use]
    pub fn from_bounds(low: f32, high: f32) -> Self {
        Self {
            center: (low + high) / 2.0,
            width: high - low,
        }
    }

    /// Lower bound of the window.
    #[must_use]
    pub fn low(&self) -> f32 {
        self.center - self.width / 2.0
    }

    /// Upper bound of the window.
    #[must_use]
    pub fn high(&self) -> f32 {
        self.center + self.width / 2.0
    }

    /// Map a single calibrated value to a display intensity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn map_value(&self, value: f32) -> u8 {
        let t = (value - self.low()) / self.width;
        (t.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// Window a whole field into a visualization image.
    #[must_use = "returns the windowed image"]
    pub fn apply(&self, field: &ScalarField) -> VisualizationImage {
        GrayImage::from_fn(field.width(), field.height(), |x, y| {
            Luma([self.map_value(field.get(x, y))])
        })
    }

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if !(self.center.is_finite() && self.width.is_finite() && self.width > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "window width must be positive and finite, got center={} width={}",
                self.center, self.width
            )));
        }
        Ok(())
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CENTER, Self::DEFAULT_WIDTH)
    }
}

/// Stretch the full value range of `field` onto 0..=255.
///
/// A constant field maps to all zeros.
#[must_use = "returns the normalized image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize_min_max(field: &ScalarField) -> GrayImage {
    let (lo, hi) = field.min_max();
    let span = hi - lo;
    GrayImage::from_fn(field.width(), field.height(), |x, y| {
        if span <= 0.0 {
            return Luma([0]);
        }
        let t = (field.get(x, y) - lo) / span;
        Luma([(t * 255.0).round() as u8])
    })
}
