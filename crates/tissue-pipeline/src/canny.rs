//! Canny edge detection.
//!
//! Gaussian smoothing (sigma 1.4), Sobel gradients with clamped borders,
//! non-maximum suppression along the quantized gradient direction, then
//! hysteresis: pixels above `high` seed edges, and pixels above `low`
//! join an edge if they are 8-connected to one.
//!
//! `imageproc::edges::canny` can index out of bounds while tracing
//! hysteresis from border pixels, so the whole detector lives here with
//! every neighbour lookup bounds-checked.

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Smoothing applied before gradient computation.
const PRE_BLUR_SIGMA: f32 = 1.4;

/// Minimum allowed threshold; zero would mark every pixel with any
/// gradient as an edge.
pub const MIN_THRESHOLD: f32 = 1.0;

/// 8-neighbourhood offsets.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Detect edges. Returns 255 on edges and 0 elsewhere.
///
/// Thresholds are clamped to at least [`MIN_THRESHOLD`] and `low` to at
/// most `high`.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let blurred = imageproc::filter::gaussian_blur_f32(image, PRE_BLUR_SIGMA);
    let gradient = Gradient::sobel(&blurred);
    let thinned = gradient.non_maximum_suppression();
    hysteresis(&thinned, gradient.width, gradient.height, low, high)
}

struct Gradient {
    gx: Vec<f32>,
    gy: Vec<f32>,
    magnitude: Vec<f32>,
    width: usize,
    height: usize,
}

impl Gradient {
    fn sobel(image: &GrayImage) -> Self {
        let gx: Vec<f32> = horizontal_sobel(image).iter().map(|&h| f32::from(h)).collect();
        let gy: Vec<f32> = vertical_sobel(image).iter().map(|&v| f32::from(v)).collect();
        let magnitude = gx.iter().zip(&gy).map(|(h, v)| h.hypot(*v)).collect();
        Self {
            gx,
            gy,
            magnitude,
            width: image.width() as usize,
            height: image.height() as usize,
        }
    }

    fn magnitude_at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0.0;
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let i = y as usize * self.width + x as usize;
        self.magnitude[i]
    }

    /// Keep only pixels that are local maxima across the edge.
    fn non_maximum_suppression(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.magnitude.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let i = y * self.width + x;
                let m = self.magnitude[i];
                if m == 0.0 {
                    continue;
                }
                let (dx, dy) = quantize_direction(self.gx[i], self.gy[i]);
                #[allow(clippy::cast_possible_wrap)]
                let (xi, yi) = (x as i64, y as i64);
                let ahead = self.magnitude_at(xi + dx, yi + dy);
                let behind = self.magnitude_at(xi - dx, yi - dy);
                if m >= ahead && m >= behind {
                    out[i] = m;
                }
            }
        }
        out
    }
}

/// Step towards the neighbour closest to the gradient direction.
fn quantize_direction(gx: f32, gy: f32) -> (i64, i64) {
    let mut angle = gy.atan2(gx).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if !(22.5..157.5).contains(&angle) {
        (1, 0)
    } else if angle < 67.5 {
        (1, 1)
    } else if angle < 112.5 {
        (0, 1)
    } else {
        (-1, 1)
    }
}

/// Double-threshold and trace connected weak edges from strong seeds.
fn hysteresis(magnitude: &[f32], width: usize, height: usize, low: f32, high: f32) -> GrayImage {
    let mut edges = vec![false; magnitude.len()];
    let mut stack = Vec::new();

    for (i, &m) in magnitude.iter().enumerate() {
        if m >= high && !edges[i] {
            edges[i] = true;
            stack.push(i);
            while let Some(j) = stack.pop() {
                #[allow(clippy::cast_possible_wrap)]
                let (x, y) = ((j % width) as i64, (j / width) as i64);
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let k = ny as usize * width + nx as usize;
                    if !edges[k] && magnitude[k] >= low {
                        edges[k] = true;
                        stack.push(k);
                    }
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let (w, h) = (width as u32, height as u32);
    GrayImage::from_fn(w, h, |x, y| {
        Luma([if edges[y as usize * width + x as usize] { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_count(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p.0[0] > 0).count()
    }

    /// 20x20 image with a sharp vertical boundary at x = 10.
    fn vertical_step() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 0 } else { 255 }]))
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let edges = canny(&img, 50.0, 150.0);
        assert_eq!(edges.dimensions(), (16, 16));
        assert_eq!(edge_count(&edges), 0);
    }

    #[test]
    fn vertical_step_is_detected_near_boundary() {
        let edges = canny(&vertical_step(), 50.0, 150.0);
        assert!(edge_count(&edges) > 0);
        for (x, _, p) in edges.enumerate_pixels() {
            if p.0[0] > 0 {
                assert!((8..=11).contains(&x), "edge at column {x}");
            }
        }
    }

    #[test]
    fn edge_touching_border_does_not_panic() {
        let img = GrayImage::from_fn(8, 8, |x, y| Luma([if x == 0 || y == 0 { 255 } else { 0 }]));
        let edges = canny(&img, 1.0, 10.0);
        assert_eq!(edges.dimensions(), (8, 8));
    }

    #[test]
    fn output_is_binary() {
        let edges = canny(&vertical_step(), 20.0, 60.0);
        assert!(edges.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn inverted_thresholds_are_clamped() {
        // low > high must not panic.
        let edges = canny(&vertical_step(), 200.0, 100.0);
        assert!(edge_count(&edges) > 0);
    }

    #[test]
    fn direction_quantization() {
        assert_eq!(quantize_direction(1.0, 0.0), (1, 0));
        assert_eq!(quantize_direction(0.0, 1.0), (0, 1));
        assert_eq!(quantize_direction(1.0, 1.0), (1, 1));
        assert_eq!(quantize_direction(-1.0, 1.0), (-1, 1));
        assert_eq!(quantize_direction(-1.0, 0.0), (1, 0));
    }

    #[test]
    fn single_pixel_image() {
        let img = GrayImage::from_pixel(1, 1, Luma([255]));
        assert_eq!(edge_count(&canny(&img, 50.0, 150.0)), 0);
    }
}
