//! Binary morphology, hole filling and connected-component filtering.
//!
//! Thin wrappers over [`imageproc::morphology`] and
//! [`imageproc::region_labelling`] that speak [`BinaryMask`] instead of
//! raw `GrayImage`s. Structuring elements are discs (`Norm::L2`) of the
//! given radius: radius 1 is the 3x3 cross, radius 2 the 5x5 disc.
//! A radius of zero is the identity.

use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::{BinaryMask, PipelineError};

/// Set every pixel within `radius` of a set pixel.
#[must_use = "returns the dilated mask"]
pub fn dilate(mask: &BinaryMask, radius: u8) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    BinaryMask::from_gray(imageproc::morphology::dilate(mask.as_gray(), Norm::L2, radius))
}

/// Clear every pixel within `radius` of an unset pixel.
#[must_use = "returns the eroded mask"]
pub fn erode(mask: &BinaryMask, radius: u8) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    BinaryMask::from_gray(imageproc::morphology::erode(mask.as_gray(), Norm::L2, radius))
}

/// Erosion followed by dilation: removes specks smaller than the disc.
#[must_use = "returns the opened mask"]
pub fn open(mask: &BinaryMask, radius: u8) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    BinaryMask::from_gray(imageproc::morphology::open(mask.as_gray(), Norm::L2, radius))
}

/// Dilation followed by erosion: bridges gaps narrower than the disc.
#[must_use = "returns the closed mask"]
pub fn close(mask: &BinaryMask, radius: u8) -> BinaryMask {
    if radius == 0 {
        return mask.clone();
    }
    BinaryMask::from_gray(imageproc::morphology::close(mask.as_gray(), Norm::L2, radius))
}

/// Fill every background region not connected to the image border.
///
/// Background is labelled with 4-connectivity (the complement of an
/// 8-connected foreground), so a diagonal gap in the foreground wall does
/// not let the outside leak into a cavity. The background reachable from
/// the border, XORed with the whole background, leaves the cavities.
///
/// # Errors
///
/// Never fails for a well-formed mask; the set operations it is built
/// from report [`PipelineError::DimensionMismatch`].
pub fn fill_holes(mask: &BinaryMask) -> Result<BinaryMask, PipelineError> {
    let (w, h) = (mask.width(), mask.height());
    if w == 0 || h == 0 {
        return Ok(mask.clone());
    }
    let background = mask.invert();
    let labels = connected_components(background.as_gray(), Connectivity::Four, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut touches_border = vec![false; max_label + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
            touches_border[p.0[0] as usize] = true;
        }
    }

    let outside = BinaryMask::from_fn(w, h, |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        label != 0 && touches_border[label]
    });
    let cavities = background.xor(&outside)?;
    mask.or(&cavities)
}

/// Drop 8-connected regions with fewer than `min_area` pixels.
#[must_use = "returns the filtered mask"]
pub fn remove_small_components(mask: &BinaryMask, min_area: usize) -> BinaryMask {
    if min_area <= 1 {
        return mask.clone();
    }
    let labels = connected_components(mask.as_gray(), Connectivity::Eight, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0usize; max_label + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }

    BinaryMask::from_fn(mask.width(), mask.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        label != 0 && areas[label] >= min_area
    })
}
