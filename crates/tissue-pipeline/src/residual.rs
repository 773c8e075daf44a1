//! Residual-learning denoiser adapter.
//!
//! A residual model predicts the *noise* in an image rather than the clean
//! image. The adapter scales the 8-bit input to `[0, 1]`, asks the model
//! for the residual, subtracts it, clamps to `[0, 1]` and scales back:
//!
//! ```text
//! clean = clamp(input / 255 - residual, 0, 1) * 255
//! ```
//!
//! Models sit behind the [`NoiseModel`] trait. With the `onnx` feature
//! enabled, [`ResidualDenoiser::load`] reads an ONNX file with one
//! `[1, 1, H, W]` float input and one output of the same shape. Without it,
//! loading fails with [`ModelLoadError::BackendUnavailable`] and callers
//! fall back to a classical filter.

use std::fmt;
use std::path::{Path, PathBuf};

use image::Luma;
use log::warn;

use crate::types::{FloatImage, VisualizationImage};

/// A model that predicts the additive noise component of an image.
pub trait NoiseModel: Send + Sync {
    /// Predict the residual for `input`, whose values are in `[0, 1]`.
    ///
    /// The returned raster must have the same dimensions as `input`.
    ///
    /// # Errors
    ///
    /// Returns [`DenoiseError::Inference`] if the backend fails.
    fn predict_residual(&self, input: &FloatImage) -> Result<FloatImage, DenoiseError>;

    /// Short description for logs.
    fn name(&self) -> &str;
}

/// Why a model file could not be turned into a denoiser.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    /// No file at the given path.
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("failed to read model {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file was read but is not a usable model.
    #[error("invalid model {}: {reason}", path.display())]
    Invalid {
        /// Path of the rejected model.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// This build has no inference backend.
    #[error("no inference backend compiled in (enable the `onnx` feature)")]
    BackendUnavailable,
}

/// Failure while running a loaded model.
#[derive(Debug, thiserror::Error)]
pub enum DenoiseError {
    /// The input image has zero area.
    #[error("cannot denoise an empty image")]
    EmptyInput,

    /// The model returned a residual of the wrong size.
    #[error("residual is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        /// Input width.
        expected_width: u32,
        /// Input height.
        expected_height: u32,
        /// Residual width.
        actual_width: u32,
        /// Residual height.
        actual_height: u32,
    },

    /// The backend reported an error.
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Denoiser that subtracts a model's predicted residual.
pub struct ResidualDenoiser {
    model: Box<dyn NoiseModel>,
}

impl fmt::Debug for ResidualDenoiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResidualDenoiser")
            .field("model", &self.model.name())
            .finish()
    }
}

impl ResidualDenoiser {
    /// Wrap an already constructed model.
    #[must_use]
    pub fn with_model(model: impl NoiseModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// Load a model from `path`.
    ///
    /// # Errors
    ///
    /// - [`ModelLoadError::NotFound`] if nothing exists at `path`.
    /// - [`ModelLoadError::Io`] if the path cannot be inspected.
    /// - [`ModelLoadError::Invalid`] if it is not a regular non-empty file
    ///   or the backend rejects it.
    /// - [`ModelLoadError::BackendUnavailable`] if built without `onnx`.
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let metadata = std::fs::metadata(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ModelLoadError::NotFound(path.to_path_buf())
            } else {
                ModelLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(ModelLoadError::Invalid {
                path: path.to_path_buf(),
                reason: "not a non-empty regular file".to_string(),
            });
        }
        Self::load_backend(path)
    }

    #[cfg(feature = "onnx")]
    fn load_backend(path: &Path) -> Result<Self, ModelLoadError> {
        let model = crate::onnx::OnnxNoiseModel::load(path)?;
        log::info!("loaded residual model {}", path.display());
        Ok(Self::with_model(model))
    }

    #[cfg(not(feature = "onnx"))]
    #[allow(clippy::unnecessary_wraps)]
    fn load_backend(_path: &Path) -> Result<Self, ModelLoadError> {
        Err(ModelLoadError::BackendUnavailable)
    }

    /// Load a model, logging a warning and returning `None` on failure.
    ///
    /// A missing or broken model is recoverable: the comparison pipeline
    /// substitutes non-local means for the advanced variant.
    #[must_use]
    pub fn load_or_warn(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(denoiser) => Some(denoiser),
            Err(e) => {
                warn!("{e}; falling back to non-local means");
                None
            }
        }
    }

    /// Name of the wrapped model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Denoise an 8-bit image. The output has the same dimensions.
    ///
    /// # Errors
    ///
    /// - [`DenoiseError::EmptyInput`] for a zero-area image.
    /// - [`DenoiseError::ShapeMismatch`] if the model returns a residual
    ///   of the wrong size.
    /// - [`DenoiseError::Inference`] if the model fails.
    pub fn denoise(&self, image: &VisualizationImage) -> Result<VisualizationImage, DenoiseError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DenoiseError::EmptyInput);
        }
        let input = to_unit_range(image);
        let residual = self.model.predict_residual(&input)?;
        if residual.dimensions() != input.dimensions() {
            return Err(DenoiseError::ShapeMismatch {
                expected_width: input.width(),
                expected_height: input.height(),
                actual_width: residual.width(),
                actual_height: residual.height(),
            });
        }
        Ok(subtract_residual(&input, &residual))
    }
}

/// Scale 8-bit intensities to `[0, 1]`.
fn to_unit_range(image: &VisualizationImage) -> FloatImage {
    FloatImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([f32::from(image.get_pixel(x, y).0[0]) / 255.0])
    })
}

/// `clamp(input - residual, 0, 1)`, scaled back to 8 bits. A non-finite
/// residual leaves the input pixel unchanged.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn subtract_residual(input: &FloatImage, residual: &FloatImage) -> VisualizationImage {
    VisualizationImage::from_fn(input.width(), input.height(), |x, y| {
        let i = input.get_pixel(x, y).0[0];
        let r = residual.get_pixel(x, y).0[0];
        let clean = if r.is_finite() { i - r } else { i };
        Luma([(clean.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Predicts the same residual everywhere.
    struct ConstantResidual(f32);

    impl NoiseModel for ConstantResidual {
        fn predict_residual(&self, input: &FloatImage) -> Result<FloatImage, DenoiseError> {
            Ok(FloatImage::from_pixel(input.width(), input.height(), Luma([self.0])))
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    /// Returns a residual one pixel too narrow.
    struct WrongShape;

    impl NoiseModel for WrongShape {
        fn predict_residual(&self, input: &FloatImage) -> Result<FloatImage, DenoiseError> {
            Ok(FloatImage::new(input.width() - 1, input.height()))
        }

        fn name(&self) -> &str {
            "wrong-shape"
        }
    }

    struct Failing;

    impl NoiseModel for Failing {
        fn predict_residual(&self, _input: &FloatImage) -> Result<FloatImage, DenoiseError> {
            Err(DenoiseError::Inference("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn residual_is_subtracted_not_added() {
        let img = VisualizationImage::from_pixel(4, 3, Luma([153])); // 0.6
        let out = ResidualDenoiser::with_model(ConstantResidual(0.2))
            .denoise(&img)
            .unwrap();
        // 0.6 - 0.2 = 0.4 -> 102
        assert!(out.pixels().all(|p| p.0[0] == 102));
    }

    #[test]
    fn zero_residual_is_identity() {
        let img = VisualizationImage::from_fn(5, 5, |x, y| Luma([u8::try_from(x * 40 + y).unwrap()]));
        let out = ResidualDenoiser::with_model(ConstantResidual(0.0))
            .denoise(&img)
            .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn output_is_clamped() {
        let img = VisualizationImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 10 } else { 250 }]));
        let low = ResidualDenoiser::with_model(ConstantResidual(0.5))
            .denoise(&img)
            .unwrap();
        assert_eq!(low.get_pixel(0, 0).0[0], 0);
        let high = ResidualDenoiser::with_model(ConstantResidual(-0.5))
            .denoise(&img)
            .unwrap();
        assert_eq!(high.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn wrong_residual_shape_is_an_error() {
        let img = VisualizationImage::new(4, 4);
        let err = ResidualDenoiser::with_model(WrongShape)
            .denoise(&img)
            .unwrap_err();
        assert!(matches!(
            err,
            DenoiseError::ShapeMismatch {
                expected_width: 4,
                actual_width: 3,
                ..
            }
        ));
    }

    #[test]
    fn empty_input_is_an_error() {
        let img = VisualizationImage::new(0, 0);
        let err = ResidualDenoiser::with_model(ConstantResidual(0.0))
            .denoise(&img)
            .unwrap_err();
        assert!(matches!(err, DenoiseError::EmptyInput));
    }

    #[test]
    fn backend_errors_propagate() {
        let img = VisualizationImage::new(2, 2);
        let err = ResidualDenoiser::with_model(Failing).denoise(&img).unwrap_err();
        assert_eq!(err.to_string(), "inference failed: boom");
    }

    #[test]
    fn missing_model_file_is_not_found() {
        let path = Path::new("/nonexistent/dir/model.onnx");
        let err = ResidualDenoiser::load(path).unwrap_err();
        assert!(matches!(err, ModelLoadError::NotFound(_)));
        assert!(ResidualDenoiser::load_or_warn(path).is_none());
    }

    #[test]
    fn directory_is_not_a_model() {
        let err = ResidualDenoiser::load(&std::env::temp_dir()).unwrap_err();
        assert!(matches!(err, ModelLoadError::Invalid { .. }));
    }

    #[test]
    fn debug_shows_model_name() {
        let d = ResidualDenoiser::with_model(ConstantResidual(0.0));
        assert_eq!(format!("{d:?}"), r#"ResidualDenoiser { model: "constant" }"#);
        assert_eq!(d.model_name(), "constant");
    }
}
