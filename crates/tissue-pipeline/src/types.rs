//! Shared types for the tissue segmentation pipeline.

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::denoise::DenoiseConfig;
use crate::overlay::OverlayConfig;
use crate::segment::SegmentationConfig;
use crate::window::Window;

/// Re-export `GrayImage` so downstream crates can reference 8-bit
/// rasters without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for the colorized overlays.
pub use image::RgbImage;

/// 8-bit single-channel display image produced by windowing a
/// [`ScalarField`]. Used for display and as denoiser input.
pub type VisualizationImage = GrayImage;

/// Three-channel overlay output.
pub type ColorImage = RgbImage;

/// Single-channel floating-point raster.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Number of pixels covered by these dimensions.
    #[must_use]
    pub const fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A 2-D grid of calibrated intensity values (e.g. Hounsfield units).
///
/// Always non-empty and finite: every constructor validates its input, so
/// downstream stages never see a zero-area or NaN-bearing field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField(FloatImage);

impl ScalarField {
    /// Build a field from row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if the grid has zero area,
    /// if `values.len() != width * height`, or if any value is not finite.
    pub fn from_raw(width: u32, height: u32, values: Vec<f32>) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "scalar field has zero area ({width}x{height})"
            )));
        }
        let expected = Dimensions { width, height }.area();
        if values.len() != expected {
            return Err(PipelineError::InvalidInput(format!(
                "scalar field of {width}x{height} needs {expected} values, got {}",
                values.len()
            )));
        }
        let image = FloatImage::from_raw(width, height, values).ok_or_else(|| {
            PipelineError::InvalidInput("scalar field buffer rejected".to_string())
        })?;
        Self::from_image(image)
    }

    /// Build a field by evaluating `f` at every pixel.
    ///
    /// # Errors
    ///
    /// Same conditions as [`from_raw`](Self::from_raw).
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> f32,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "scalar field has zero area ({width}x{height})"
            )));
        }
        Self::from_image(FloatImage::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    /// Wrap an existing floating-point raster.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for an empty raster or one
    /// containing non-finite values.
    pub fn from_image(image: FloatImage) -> Result<Self, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidInput(
                "scalar field has zero area".to_string(),
            ));
        }
        if let Some(pos) = image.as_raw().iter().position(|v| !v.is_finite()) {
            let width = image.width() as usize;
            return Err(PipelineError::InvalidInput(format!(
                "non-finite value at ({}, {})",
                pos % width,
                pos / width
            )));
        }
        Ok(Self(image))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height together.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Value at `(x, y)`. Panics if out of bounds, like
    /// [`ImageBuffer::get_pixel`].
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.0.get_pixel(x, y).0[0]
    }

    /// Row-major values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        self.0.as_raw()
    }

    /// The underlying raster.
    #[must_use]
    pub const fn as_image(&self) -> &FloatImage {
        &self.0
    }

    /// Smallest and largest value in the field.
    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.values()
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Wrap a raster produced by an internal filter from an already
    /// validated field. Filters preserve dimensions and finiteness.
    pub(crate) const fn from_filtered(image: FloatImage) -> Self {
        Self(image)
    }
}

/// Foreground value stored in a [`BinaryMask`].
const MASK_ON: u8 = 255;

/// Membership of each pixel in one tissue class.
///
/// Stored as a `GrayImage` of 0 / 255 so it feeds directly into
/// `imageproc` morphology and labelling. All set operations return new
/// masks; operands must share dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// An all-false mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Build a mask by evaluating a predicate at every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { MASK_ON } else { 0 }])
        }))
    }

    /// Interpret any non-zero pixel of `image` as set.
    #[must_use]
    pub fn from_gray(mut image: GrayImage) -> Self {
        for p in image.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = MASK_ON;
            }
        }
        Self(image)
    }

    /// Threshold a scalar field with `predicate`.
    #[must_use]
    pub fn threshold(field: &ScalarField, predicate: impl Fn(f32) -> bool) -> Self {
        Self::from_fn(field.width(), field.height(), |x, y| predicate(field.get(x, y)))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height together.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.0.width(),
            height: self.0.height(),
        }
    }

    /// Whether `(x, y)` is set.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] != 0
    }

    /// Number of set pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v != 0).count()
    }

    /// `true` if no pixel is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.as_raw().iter().all(|&v| v == 0)
    }

    /// Pixel-wise intersection.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the masks differ in
    /// size. The same holds for the other binary set operations.
    pub fn and(&self, other: &Self) -> Result<Self, PipelineError> {
        self.zip_with(other, |a, b| a && b)
    }

    /// Pixel-wise union.
    ///
    /// # Errors
    ///
    /// See [`and`](Self::and).
    pub fn or(&self, other: &Self) -> Result<Self, PipelineError> {
        self.zip_with(other, |a, b| a || b)
    }

    /// Pixels set in `self` but not in `other`.
    ///
    /// # Errors
    ///
    /// See [`and`](Self::and).
    pub fn and_not(&self, other: &Self) -> Result<Self, PipelineError> {
        self.zip_with(other, |a, b| a && !b)
    }

    /// Pixel-wise exclusive or.
    ///
    /// # Errors
    ///
    /// See [`and`](Self::and).
    pub fn xor(&self, other: &Self) -> Result<Self, PipelineError> {
        self.zip_with(other, |a, b| a != b)
    }

    /// Complement of the mask.
    #[must_use]
    pub fn invert(&self) -> Self {
        let mut out = self.0.clone();
        for p in out.pixels_mut() {
            p.0[0] = if p.0[0] == 0 { MASK_ON } else { 0 };
        }
        Self(out)
    }

    /// `true` if no pixel is set in both masks. Masks of different sizes
    /// are never disjoint.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.dimensions() == other.dimensions()
            && self
                .0
                .as_raw()
                .iter()
                .zip(other.0.as_raw())
                .all(|(&a, &b)| a == 0 || b == 0)
    }

    /// Coordinates of every set pixel, row-major.
    pub fn iter_set(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.0
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] != 0)
            .map(|(x, y, _)| (x, y))
    }

    /// The 0 / 255 raster backing this mask.
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Consume the mask and return its 0 / 255 raster.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    fn zip_with(
        &self,
        other: &Self,
        op: impl Fn(bool, bool) -> bool,
    ) -> Result<Self, PipelineError> {
        let dims = self.dimensions();
        PipelineError::check_dimensions(dims, other.dimensions())?;
        let data = self
            .0
            .as_raw()
            .iter()
            .zip(other.0.as_raw())
            .map(|(&a, &b)| if op(a != 0, b != 0) { MASK_ON } else { 0 })
            .collect();
        GrayImage::from_raw(dims.width, dims.height, data)
            .map(Self)
            .ok_or_else(|| PipelineError::InvalidInput("mask buffer rejected".to_string()))
    }
}

/// The three tissue classes, in overlay paint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TissueClass {
    /// Adipose tissue: low negative intensity band.
    Fat,
    /// Muscle and tendon: near-zero to moderate positive band.
    Muscle,
    /// Bone: everything above a high positive threshold.
    Bone,
}

impl TissueClass {
    /// All classes in paint order (fat, muscle, bone).
    pub const ALL: [Self; 3] = [Self::Fat, Self::Muscle, Self::Bone];

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fat => "Fat",
            Self::Muscle => "Muscle / Tendon",
            Self::Bone => "Bone",
        }
    }
}

/// Fat, muscle and bone masks for one slice.
///
/// Masks returned by [`crate::segment`] are pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TissueMaskSet {
    /// Fat mask.
    pub fat: BinaryMask,
    /// Muscle / tendon mask.
    pub muscle: BinaryMask,
    /// Bone mask.
    pub bone: BinaryMask,
}

impl TissueMaskSet {
    /// Three all-false masks.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        let blank = BinaryMask::new(dimensions.width, dimensions.height);
        Self {
            fat: blank.clone(),
            muscle: blank.clone(),
            bone: blank,
        }
    }

    /// Mask for `class`.
    #[must_use]
    pub const fn get(&self, class: TissueClass) -> &BinaryMask {
        match class {
            TissueClass::Fat => &self.fat,
            TissueClass::Muscle => &self.muscle,
            TissueClass::Bone => &self.bone,
        }
    }

    /// `(class, mask)` pairs in paint order.
    pub fn iter(&self) -> impl Iterator<Item = (TissueClass, &BinaryMask)> {
        TissueClass::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// Dimensions of the fat mask. Use
    /// [`check_dimensions`](Self::check_dimensions) when the set comes from
    /// outside [`crate::segment`].
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.fat.dimensions()
    }

    /// Dimensions shared by all three masks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] naming the first mask
    /// whose size differs from the fat mask.
    pub fn check_dimensions(&self) -> Result<Dimensions, PipelineError> {
        let expected = self.fat.dimensions();
        PipelineError::check_dimensions(expected, self.muscle.dimensions())?;
        PipelineError::check_dimensions(expected, self.bone.dimensions())?;
        Ok(expected)
    }

    /// `true` if all three masks are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, m)| m.is_empty())
    }

    /// `true` if no pixel belongs to more than one class.
    #[must_use]
    pub fn is_disjoint(&self) -> bool {
        self.fat.is_disjoint(&self.muscle)
            && self.fat.is_disjoint(&self.bone)
            && self.muscle.is_disjoint(&self.bone)
    }
}

/// Configuration for the full comparison pipeline.
///
/// Every numeric constant of the algorithm lives in one of the nested
/// configs so it can be tuned per dataset. Round-trips through JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Display window used to build the 8-bit visualization image.
    pub window: Window,
    /// Thresholds, structuring-element radii and component areas.
    pub segmentation: SegmentationConfig,
    /// Overlay colors, alpha and outlines.
    pub overlay: OverlayConfig,
    /// Classical filter parameters and scalar-field smoothing.
    pub denoise: DenoiseConfig,
}

impl PipelineConfig {
    /// Check every nested config.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first invalid
    /// parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.window.validate()?;
        self.segmentation.validate()?;
        self.overlay.validate()?;
        self.denoise.validate()
    }
}

/// Errors surfaced by the core API.
///
/// Degenerate slices (body below the minimum size) are not errors; they
/// yield empty masks and zero statistics.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Empty or malformed scalar field / image.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Two inputs that must be pixel-aligned have different sizes.
    #[error("dimension mismatch: expected {}x{}, got {}x{}", expected.width, expected.height, actual.width, actual.height)]
    DimensionMismatch {
        /// Dimensions of the reference input.
        expected: Dimensions,
        /// Dimensions of the offending input.
        actual: Dimensions,
    },

    /// A configuration value is out of range.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Fail with [`DimensionMismatch`](Self::DimensionMismatch) unless the
    /// two sizes agree.
    pub(crate) fn check_dimensions(
        expected: Dimensions,
        actual: Dimensions,
    ) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }
}
