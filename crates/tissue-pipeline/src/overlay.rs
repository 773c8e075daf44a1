//! Colorized tissue overlays.
//!
//! Each class is painted over the base image in fixed order (fat, muscle,
//! bone) with its own color, then, if enabled, the boundary of each mask
//! is drawn in a darker shade of the same color. Mask boundaries come from
//! Canny edge detection on the binary mask, thickened by dilation.

use std::fmt;

use image::Rgb;
use serde::{Deserialize, Serialize};

use crate::canny;
use crate::morphology;
use crate::types::{
    BinaryMask, ColorImage, Dimensions, PipelineError, TissueClass, TissueMaskSet,
    VisualizationImage,
};

/// Canny thresholds for mask boundaries. A binary mask has a full-scale
/// step at every boundary, so any reasonable pair works.
const OUTLINE_LOW_THRESHOLD: f32 = 50.0;
const OUTLINE_HIGH_THRESHOLD: f32 = 150.0;

/// How a class color is combined with the base pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// `base * (1 - alpha) + color * alpha`.
    #[default]
    Over,
    /// `min(base + color * alpha, 255)`: brightens without darkening.
    Additive,
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Over => f.write_str("Over"),
            Self::Additive => f.write_str("Additive"),
        }
    }
}

/// RGB color for each tissue class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassColors {
    /// Fat color.
    pub fat: [u8; 3],
    /// Muscle / tendon color.
    pub muscle: [u8; 3],
    /// Bone color.
    pub bone: [u8; 3],
}

impl ClassColors {
    /// Color for `class`.
    #[must_use]
    pub const fn get(&self, class: TissueClass) -> [u8; 3] {
        match class {
            TissueClass::Fat => self.fat,
            TissueClass::Muscle => self.muscle,
            TissueClass::Bone => self.bone,
        }
    }
}

impl Default for ClassColors {
    fn default() -> Self {
        Self {
            fat: [255, 200, 0],
            muscle: [200, 0, 100],
            bone: [0, 255, 255],
        }
    }
}

/// Overlay appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Opacity of the class colors, in `[0, 1]`.
    pub alpha: f32,
    /// Blending formula.
    pub blend_mode: BlendMode,
    /// Class colors.
    pub colors: ClassColors,
    /// Draw mask boundaries.
    pub outline: bool,
    /// Dilation radius applied to the detected boundary.
    pub outline_thickness: u8,
    /// Outline color is the class color scaled by this factor.
    pub outline_shade: f32,
}

impl OverlayConfig {
    /// Default fill opacity.
    pub const DEFAULT_ALPHA: f32 = 0.55;
    /// Default outline shade factor.
    pub const DEFAULT_OUTLINE_SHADE: f32 = 0.6;

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(PipelineError::InvalidConfig(format!(
                "overlay alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.outline_shade) {
            return Err(PipelineError::InvalidConfig(format!(
                "outline shade must be in [0, 1], got {}",
                self.outline_shade
            )));
        }
        Ok(())
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
            blend_mode: BlendMode::default(),
            colors: ClassColors::default(),
            outline: true,
            outline_thickness: 1,
            outline_shade: Self::DEFAULT_OUTLINE_SHADE,
        }
    }
}

/// Render `masks` over a grayscale base image.
///
/// # Errors
///
/// - [`PipelineError::InvalidInput`] if `base` has zero area.
/// - [`PipelineError::DimensionMismatch`] if any mask differs in size
///   from `base` or from the other masks.
/// - [`PipelineError::InvalidConfig`] if `config` is out of range.
pub fn render(
    base: &VisualizationImage,
    masks: &TissueMaskSet,
    config: &OverlayConfig,
) -> Result<ColorImage, PipelineError> {
    let color = ColorImage::from_fn(base.width(), base.height(), |x, y| {
        let v = base.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });
    render_color(&color, masks, config)
}

/// Render `masks` over an existing color image.
///
/// # Errors
///
/// Same as [`render`].
pub fn render_color(
    base: &ColorImage,
    masks: &TissueMaskSet,
    config: &OverlayConfig,
) -> Result<ColorImage, PipelineError> {
    if base.width() == 0 || base.height() == 0 {
        return Err(PipelineError::InvalidInput(
            "overlay base image is empty".to_string(),
        ));
    }
    config.validate()?;
    let (width, height) = base.dimensions();
    PipelineError::check_dimensions(Dimensions { width, height }, masks.check_dimensions()?)?;

    let mut out = base.clone();
    for (class, mask) in masks.iter() {
        let color = config.colors.get(class);
        for (x, y) in mask.iter_set() {
            let px = out.get_pixel_mut(x, y);
            *px = blend(*px, color, config.alpha, config.blend_mode);
        }
    }

    if config.outline {
        for (class, mask) in masks.iter() {
            let dark = shade(config.colors.get(class), config.outline_shade);
            for (x, y) in outline(mask, config.outline_thickness).iter_set() {
                out.put_pixel(x, y, Rgb(dark));
            }
        }
    }

    Ok(out)
}

/// Thickened boundary of `mask`.
#[must_use = "returns the outline mask"]
pub fn outline(mask: &BinaryMask, thickness: u8) -> BinaryMask {
    if mask.is_empty() {
        return mask.clone();
    }
    let edges = canny::canny(mask.as_gray(), OUTLINE_LOW_THRESHOLD, OUTLINE_HIGH_THRESHOLD);
    morphology::dilate(&BinaryMask::from_gray(edges), thickness)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(base: Rgb<u8>, color: [u8; 3], alpha: f32, mode: BlendMode) -> Rgb<u8> {
    let mut out = [0u8; 3];
    for ((o, &b), &c) in out.iter_mut().zip(&base.0).zip(&color) {
        let (b, c) = (f32::from(b), f32::from(c));
        let v = match mode {
            BlendMode::Over => b.mul_add(1.0 - alpha, c * alpha),
            BlendMode::Additive => c.mul_add(alpha, b),
        };
        *o = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shade(color: [u8; 3], factor: f32) -> [u8; 3] {
    color.map(|c| (f32::from(c) * factor).round().clamp(0.0, 255.0) as u8)
}
