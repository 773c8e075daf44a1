//! Technique gallery: the intermediate images that illustrate each
//! classical operator on the visualization image.
//!
//! None of these feed the segmentation; they are exported next to the
//! comparison so a reader can see what smoothing, edge detection and
//! grayscale morphology do to the slice.

use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use serde::{Deserialize, Serialize};

use crate::blur;
use crate::canny;
use crate::types::{PipelineError, VisualizationImage};

/// Gallery operator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechniqueConfig {
    /// Gaussian sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny low threshold.
    pub canny_low: f32,
    /// Canny high threshold.
    pub canny_high: f32,
    /// Radius of the square used for erosion and dilation (5x5 at 2).
    pub square_radius: u8,
    /// Radius of the disc used for top-hat and black-hat (15x15 at 7).
    pub hat_radius: u8,
}

impl Default for TechniqueConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            canny_low: 50.0,
            canny_high: 150.0,
            square_radius: 2,
            hat_radius: 7,
        }
    }
}

/// The gallery images, each the size of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechniqueGallery {
    /// Gaussian-smoothed image.
    pub gaussian: VisualizationImage,
    /// Canny edges of the smoothed image.
    pub edges: VisualizationImage,
    /// Grayscale erosion.
    pub eroded: VisualizationImage,
    /// Grayscale dilation.
    pub dilated: VisualizationImage,
    /// White top-hat: image minus its opening. Small bright detail.
    pub top_hat: VisualizationImage,
    /// Black top-hat: closing minus image. Small dark detail.
    pub black_hat: VisualizationImage,
}

impl TechniqueGallery {
    /// Build every gallery image from `image`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] for an empty image.
    pub fn build(
        image: &VisualizationImage,
        config: &TechniqueConfig,
    ) -> Result<Self, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::InvalidInput(
                "gallery input is empty".to_string(),
            ));
        }

        let gaussian = blur::gaussian_blur(image, config.blur_sigma);
        let edges = canny::canny(&gaussian, config.canny_low, config.canny_high);

        let square = Mask::square(config.square_radius);
        let eroded = grayscale_erode(image, &square);
        let dilated = grayscale_dilate(image, &square);

        let disc = Mask::disk(config.hat_radius);
        let opened = grayscale_dilate(&grayscale_erode(image, &disc), &disc);
        let closed = grayscale_erode(&grayscale_dilate(image, &disc), &disc);

        Ok(Self {
            gaussian,
            edges,
            eroded,
            dilated,
            top_hat: saturating_difference(image, &opened),
            black_hat: saturating_difference(&closed, image),
        })
    }

    /// `(file stem, image)` pairs in a stable order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, &VisualizationImage); 6] {
        [
            ("gaussian", &self.gaussian),
            ("canny", &self.edges),
            ("erosion", &self.eroded),
            ("dilation", &self.dilated),
            ("tophat", &self.top_hat),
            ("blackhat", &self.black_hat),
        ]
    }
}

fn saturating_difference(a: &VisualizationImage, b: &VisualizationImage) -> VisualizationImage {
    VisualizationImage::from_fn(a.width(), a.height(), |x, y| {
        image::Luma([a.get_pixel(x, y).0[0].saturating_sub(b.get_pixel(x, y).0[0])])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    /// Mid-gray background with one bright and one dark pixel.
    fn specks() -> VisualizationImage {
        VisualizationImage::from_fn(21, 21, |x, y| match (x, y) {
            (5, 5) => Luma([250]),
            (15, 15) => Luma([10]),
            _ => Luma([128]),
        })
    }

    #[test]
    fn all_images_match_input_size() {
        let gallery = TechniqueGallery::build(&specks(), &TechniqueConfig::default()).unwrap();
        for (name, img) in gallery.named() {
            assert_eq!(img.dimensions(), (21, 21), "{name}");
        }
    }

    #[test]
    fn erosion_removes_bright_speck_and_dilation_spreads_it() {
        let gallery = TechniqueGallery::build(&specks(), &TechniqueConfig::default()).unwrap();
        assert_eq!(gallery.eroded.get_pixel(5, 5).0[0], 128);
        assert_eq!(gallery.dilated.get_pixel(7, 7).0[0], 250);
        assert_eq!(gallery.eroded.get_pixel(13, 13).0[0], 10);
    }

    #[test]
    fn hats_isolate_small_details() {
        let gallery = TechniqueGallery::build(&specks(), &TechniqueConfig::default()).unwrap();
        assert_eq!(gallery.top_hat.get_pixel(5, 5).0[0], 250 - 128);
        assert_eq!(gallery.top_hat.get_pixel(0, 0).0[0], 0);
        assert_eq!(gallery.black_hat.get_pixel(15, 15).0[0], 128 - 10);
        assert_eq!(gallery.black_hat.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let img = VisualizationImage::from_pixel(10, 10, Luma([90]));
        let gallery = TechniqueGallery::build(&img, &TechniqueConfig::default()).unwrap();
        assert!(gallery.edges.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = TechniqueGallery::build(&VisualizationImage::new(0, 3), &TechniqueConfig::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
