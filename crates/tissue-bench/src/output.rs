//! Writing comparison images and statistics to an output directory.

use std::path::{Path, PathBuf};

use tissue_pipeline::{ComparisonResult, TechniqueGallery, Variant};

/// Errors raised while writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Directory creation or a plain file write failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// PNG encoding failed.
    #[error("failed to save {}: {source}", path.display())]
    Image {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// Statistics could not be serialized.
    #[error("failed to serialize statistics: {0}")]
    Json(#[from] serde_json::Error),
}

/// File name of the denoised image for `variant`.
#[must_use]
pub fn noise_file_name(variant: Variant) -> String {
    format!("{}_noise_{}.png", variant_index(variant), variant.label())
}

/// File name of the overlay for `variant`.
#[must_use]
pub fn segmentation_file_name(variant: Variant) -> String {
    format!("{}_segmentation_{}.png", variant_index(variant) + 3, variant.label())
}

/// File name of the non-local means baseline image.
pub const BASELINE_NOISE_FILE: &str = "7_noise_nlmeans.png";
/// File name of the non-local means baseline overlay.
pub const BASELINE_SEGMENTATION_FILE: &str = "8_segmentation_nlmeans.png";

const fn variant_index(variant: Variant) -> usize {
    match variant {
        Variant::Raw => 1,
        Variant::Classical => 2,
        Variant::Advanced => 3,
    }
}

/// Write the six comparison images and `stats.json` into `dir`.
///
/// When the result carries a non-local means baseline its image and
/// overlay follow as files 7 and 8. Returns the paths written, in order.
///
/// # Errors
///
/// Returns the first failing write.
pub fn write_comparison(dir: &Path, result: &ComparisonResult) -> Result<Vec<PathBuf>, OutputError> {
    create_dir(dir)?;
    let mut written = Vec::new();

    for v in &result.variants {
        let path = dir.join(noise_file_name(v.variant));
        save(&path, |p| v.visualization.save(p))?;
        written.push(path);
    }
    for v in &result.variants {
        let path = dir.join(segmentation_file_name(v.variant));
        save(&path, |p| v.overlay.save(p))?;
        written.push(path);
    }
    if let Some(baseline) = &result.nl_means_baseline {
        let path = dir.join(BASELINE_NOISE_FILE);
        save(&path, |p| baseline.visualization.save(p))?;
        written.push(path);
        let path = dir.join(BASELINE_SEGMENTATION_FILE);
        save(&path, |p| baseline.overlay.save(p))?;
        written.push(path);
    }

    let path = dir.join("stats.json");
    let json = serde_json::to_string_pretty(&result.statistics)?;
    std::fs::write(&path, json).map_err(|source| OutputError::Io {
        path: path.clone(),
        source,
    })?;
    written.push(path);

    Ok(written)
}

/// Write every gallery image as `technique_<name>.png`.
///
/// # Errors
///
/// Returns the first failing write.
pub fn write_gallery(dir: &Path, gallery: &TechniqueGallery) -> Result<Vec<PathBuf>, OutputError> {
    create_dir(dir)?;
    gallery
        .named()
        .into_iter()
        .map(|(name, image)| {
            let path = dir.join(format!("technique_{name}.png"));
            save(&path, |p| image.save(p))?;
            Ok(path)
        })
        .collect()
}

/// Write a single grayscale image.
///
/// # Errors
///
/// Returns [`OutputError`] if the directory cannot be created or the PNG
/// cannot be written.
pub fn write_gray(dir: &Path, name: &str, image: &image::GrayImage) -> Result<PathBuf, OutputError> {
    create_dir(dir)?;
    let path = dir.join(name);
    save(&path, |p| image.save(p))?;
    Ok(path)
}

fn create_dir(dir: &Path) -> Result<(), OutputError> {
    std::fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn save(
    path: &Path,
    write: impl FnOnce(&Path) -> image::ImageResult<()>,
) -> Result<(), OutputError> {
    write(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tissue_pipeline::types::FloatImage;
    use tissue_pipeline::{
        DenoiseError, NoiseModel, PipelineConfig, ResidualDenoiser, ScalarField, compare,
    };

    struct ZeroResidual;

    impl NoiseModel for ZeroResidual {
        fn predict_residual(&self, input: &FloatImage) -> Result<FloatImage, DenoiseError> {
            Ok(FloatImage::new(input.width(), input.height()))
        }

        fn name(&self) -> &str {
            "zero"
        }
    }

    fn square() -> ScalarField {
        ScalarField::from_fn(16, 16, |x, y| {
            if (4..12).contains(&x) && (4..12).contains(&y) { 60.0 } else { -1000.0 }
        })
        .unwrap()
    }

    #[test]
    fn file_names_follow_numbering() {
        let noise: Vec<String> = Variant::ALL.into_iter().map(noise_file_name).collect();
        assert_eq!(
            noise,
            ["1_noise_raw.png", "2_noise_classical.png", "3_noise_advanced.png"]
        );
        let seg: Vec<String> = Variant::ALL
            .into_iter()
            .map(segmentation_file_name)
            .collect();
        assert_eq!(
            seg,
            [
                "4_segmentation_raw.png",
                "5_segmentation_classical.png",
                "6_segmentation_advanced.png"
            ]
        );
    }

    #[test]
    fn comparison_outputs_are_written() {
        let result = compare(&square(), &PipelineConfig::default(), None).unwrap();
        let dir = std::env::temp_dir().join(format!("tissue-bench-out-{}", std::process::id()));

        let written = write_comparison(&dir, &result).unwrap();
        assert_eq!(written.len(), 7);
        assert!(written.iter().all(|p| p.is_file()));
        assert!(!dir.join(BASELINE_NOISE_FILE).exists());
        let reloaded = image::open(dir.join("4_segmentation_raw.png")).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (16, 16));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn model_run_also_writes_baseline() {
        let model = ResidualDenoiser::with_model(ZeroResidual);
        let result = compare(&square(), &PipelineConfig::default(), Some(&model)).unwrap();
        let dir =
            std::env::temp_dir().join(format!("tissue-bench-baseline-{}", std::process::id()));

        let written = write_comparison(&dir, &result).unwrap();
        assert_eq!(written.len(), 9);
        assert!(dir.join(BASELINE_NOISE_FILE).is_file());
        assert!(dir.join(BASELINE_SEGMENTATION_FILE).is_file());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
