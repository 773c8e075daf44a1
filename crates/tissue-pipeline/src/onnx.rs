//! ONNX Runtime backend for [`NoiseModel`].

use std::path::Path;

use parking_lot::Mutex;

use crate::residual::{DenoiseError, ModelLoadError, NoiseModel};
use crate::types::FloatImage;

/// Residual model executed by ONNX Runtime.
///
/// The graph takes a single `[1, 1, H, W]` float tensor and returns the
/// predicted noise in the same layout. `Session::run` needs exclusive
/// access, so the session sits behind a mutex.
pub struct OnnxNoiseModel {
    session: Mutex<ort::session::Session>,
    name: String,
}

impl OnnxNoiseModel {
    /// Build a session from the model file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelLoadError::Invalid`] if ONNX Runtime rejects the file.
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let session = ort::session::Session::builder()
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| ModelLoadError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let name = path
            .file_name()
            .map_or_else(|| "onnx".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self {
            session: Mutex::new(session),
            name,
        })
    }
}

impl NoiseModel for OnnxNoiseModel {
    fn predict_residual(&self, input: &FloatImage) -> Result<FloatImage, DenoiseError> {
        let (w, h) = input.dimensions();
        let shape = [1usize, 1, h as usize, w as usize];
        let tensor = ort::value::Tensor::from_array((shape, input.as_raw().clone()))
            .map_err(|e| DenoiseError::Inference(format!("input tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| DenoiseError::Inference(e.to_string()))?;
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DenoiseError::Inference(format!("output tensor: {e}")))?;

        let expected = w as usize * h as usize;
        if data.len() != expected {
            return Err(DenoiseError::Inference(format!(
                "model returned {} values for a {w}x{h} input",
                data.len()
            )));
        }
        FloatImage::from_raw(w, h, data.to_vec())
            .ok_or_else(|| DenoiseError::Inference("output buffer rejected".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
