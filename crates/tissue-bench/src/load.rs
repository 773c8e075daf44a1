//! Slice loading: turn files on disk into calibrated scalar fields.
//!
//! Two formats are supported:
//!
//! - grayscale PNG (8- or 16-bit), whose code range is mapped linearly
//!   onto `[min_value, max_value]`;
//! - headerless little-endian `f32`, row-major, with dimensions given on
//!   the command line.

use image::DynamicImage;
use tissue_pipeline::{PipelineError, ScalarField};

/// Errors raised while loading a slice.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The PNG could not be decoded.
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// A raw file has the wrong number of bytes for its dimensions.
    #[error("raw slice of {width}x{height} needs {expected} bytes, got {actual}")]
    RawLength {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// `width * height * 4`.
        expected: usize,
        /// File size.
        actual: usize,
    },

    /// The calibration bounds are unusable.
    #[error("calibration range [{min}, {max}] is empty or not finite")]
    Calibration {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// The decoded values do not form a valid field.
    #[error(transparent)]
    Field(#[from] PipelineError),
}

/// Decode a grayscale PNG and map its codes onto `[min_value, max_value]`.
///
/// 16-bit images use the full `0..=65535` code range, 8-bit images
/// `0..=255`. Color images are converted to luma first.
///
/// # Errors
///
/// Returns [`LoadError::Decode`] for undecodable data and
/// [`LoadError::Calibration`] for an empty or non-finite range.
pub fn field_from_png(bytes: &[u8], min_value: f32, max_value: f32) -> Result<ScalarField, LoadError> {
    if !(min_value.is_finite() && max_value.is_finite() && min_value < max_value) {
        return Err(LoadError::Calibration {
            min: min_value,
            max: max_value,
        });
    }
    let span = max_value - min_value;
    let image = image::load_from_memory(bytes)?;

    let field = match image {
        DynamicImage::ImageLuma8(gray) => ScalarField::from_fn(gray.width(), gray.height(), |x, y| {
            f32::from(gray.get_pixel(x, y).0[0]) / f32::from(u8::MAX) * span + min_value
        })?,
        other => {
            let gray = other.into_luma16();
            ScalarField::from_fn(gray.width(), gray.height(), |x, y| {
                f32::from(gray.get_pixel(x, y).0[0]) / f32::from(u16::MAX) * span + min_value
            })?
        }
    };
    Ok(field)
}

/// Interpret `bytes` as a row-major little-endian `f32` grid.
///
/// # Errors
///
/// Returns [`LoadError::RawLength`] if the byte count does not match the
/// dimensions and [`LoadError::Field`] for zero area or non-finite values.
pub fn field_from_raw(bytes: &[u8], width: u32, height: u32) -> Result<ScalarField, LoadError> {
    let expected = width as usize * height as usize * 4;
    if bytes.len() != expected {
        return Err(LoadError::RawLength {
            width,
            height,
            expected,
            actual: bytes.len(),
        });
    }
    let values = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(ScalarField::from_raw(width, height, values)?)
}

/// Parse a `WIDTHxHEIGHT` dimension string.
///
/// # Errors
///
/// Returns a message suitable for `clap` if the string is malformed or
/// either side is zero.
pub fn parse_dimensions(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid dimension {v:?} in {s:?}"))
    };
    Ok((parse(w)?, parse(h)?))
}
