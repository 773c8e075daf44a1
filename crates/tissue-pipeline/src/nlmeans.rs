//! Non-local means denoising for 8-bit images.
//!
//! Every output pixel is a weighted average of the pixels in a
//! `(2 * search_radius + 1)^2` window around it. The weight of a candidate
//! is `exp(-d / h^2)`, where `d` is the mean squared difference between
//! the `(2 * patch_radius + 1)^2` patches centered on the two pixels.
//!
//! Patch distances are computed per search offset with a summed-area
//! table, so the cost is `O(pixels * search_window)` regardless of the
//! patch size. Borders are replicated.

use image::{GrayImage, Luma};

use crate::types::PipelineError;

/// Denoise `image` with non-local means.
///
/// `strength` is the filter parameter `h`; larger values smooth more.
/// A non-positive strength returns the image unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if `image` has zero area.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn non_local_means(
    image: &GrayImage,
    strength: f32,
    patch_radius: u32,
    search_radius: u32,
) -> Result<GrayImage, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidInput(
            "cannot denoise an empty image".to_string(),
        ));
    }
    if strength <= 0.0 {
        return Ok(image.clone());
    }

    let (w, h) = (image.width() as usize, image.height() as usize);
    let (p, s) = (patch_radius as usize, search_radius as usize);
    let pad = p + s;
    let padded = Padded::replicate(image, pad);

    // Region of patch centers: every output pixel plus a patch-radius rim.
    let (rw, rh) = (w + 2 * p, h + 2 * p);
    let patch_area = ((2 * p + 1) * (2 * p + 1)) as f64;
    let inv_h2 = 1.0 / (f64::from(strength) * f64::from(strength));

    let mut acc = vec![0.0f64; w * h];
    let mut weight_sum = vec![0.0f64; w * h];
    let mut table = vec![0.0f64; (rw + 1) * (rh + 1)];

    let s_i = s as isize;
    for dy in -s_i..=s_i {
        for dx in -s_i..=s_i {
            // Summed-area table of squared differences between the image
            // and its copy shifted by (dx, dy).
            for v in 0..rh {
                let mut row_sum = 0.0;
                for u in 0..rw {
                    let a = padded.get(u + s, v + s);
                    let b = padded.get(
                        (u + s).wrapping_add_signed(dx),
                        (v + s).wrapping_add_signed(dy),
                    );
                    let d = a - b;
                    row_sum += d * d;
                    table[(v + 1) * (rw + 1) + u + 1] = table[v * (rw + 1) + u + 1] + row_sum;
                }
            }

            for y in 0..h {
                for x in 0..w {
                    let (x0, y0, x1, y1) = (x, y, x + 2 * p + 1, y + 2 * p + 1);
                    let ssd = table[y1 * (rw + 1) + x1] - table[y0 * (rw + 1) + x1]
                        - table[y1 * (rw + 1) + x0]
                        + table[y0 * (rw + 1) + x0];
                    let weight = (-(ssd / patch_area) * inv_h2).exp();
                    let value = padded.get(
                        (x + pad).wrapping_add_signed(dx),
                        (y + pad).wrapping_add_signed(dy),
                    );
                    acc[y * w + x] += weight * value;
                    weight_sum[y * w + x] += weight;
                }
            }
        }
    }

    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let i = y as usize * w + x as usize;
        // The zero offset always contributes weight 1, so the sum is > 0.
        let v = acc[i] / weight_sum[i];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    }))
}

/// Image copy with `pad` replicated pixels on every side.
struct Padded {
    data: Vec<f64>,
    width: usize,
}

impl Padded {
    fn replicate(image: &GrayImage, pad: usize) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let (pw, ph) = (w + 2 * pad, h + 2 * pad);
        let mut data = Vec::with_capacity(pw * ph);
        for v in 0..ph {
            let y = v.saturating_sub(pad).min(h - 1);
            for u in 0..pw {
                let x = u.saturating_sub(pad).min(w - 1);
                #[allow(clippy::cast_possible_truncation)]
                let px = image.get_pixel(x as u32, y as u32).0[0];
                data.push(f64::from(px));
            }
        }
        Self { data, width: pw }
    }

    fn get(&self, u: usize, v: usize) -> f64 {
        self.data[v * self.width + u]
    }
}
