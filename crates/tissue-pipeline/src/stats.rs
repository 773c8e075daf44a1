//! Per-tissue statistics over the calibrated field.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{BinaryMask, PipelineError, ScalarField, TissueClass, TissueMaskSet};

/// Count, mean and population standard deviation of the field values
/// under one mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TissueStats {
    /// Number of set mask pixels.
    pub pixel_count: usize,
    /// Mean field value, or 0 for an empty mask.
    pub mean: f64,
    /// Population standard deviation, or 0 for an empty mask.
    pub std_dev: f64,
}

/// Statistics of `field` restricted to `mask`.
///
/// An empty mask yields zeros.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the mask and field
/// differ in size.
#[allow(clippy::cast_precision_loss)]
pub fn compute_stats(field: &ScalarField, mask: &BinaryMask) -> Result<TissueStats, PipelineError> {
    PipelineError::check_dimensions(field.dimensions(), mask.dimensions())?;

    let (mut count, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
    for (x, y) in mask.iter_set() {
        let v = f64::from(field.get(x, y));
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return Ok(TissueStats::default());
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    Ok(TissueStats {
        pixel_count: count,
        mean,
        std_dev: variance.sqrt(),
    })
}

/// Statistics for all three classes of one slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceStatistics {
    /// Fat statistics.
    pub fat: TissueStats,
    /// Muscle / tendon statistics.
    pub muscle: TissueStats,
    /// Bone statistics.
    pub bone: TissueStats,
}

impl SliceStatistics {
    /// Compute statistics of `field` under each mask of `masks`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the masks and field
    /// differ in size.
    pub fn compute(field: &ScalarField, masks: &TissueMaskSet) -> Result<Self, PipelineError> {
        Ok(Self {
            fat: compute_stats(field, &masks.fat)?,
            muscle: compute_stats(field, &masks.muscle)?,
            bone: compute_stats(field, &masks.bone)?,
        })
    }

    /// Statistics for `class`.
    #[must_use]
    pub const fn get(&self, class: TissueClass) -> &TissueStats {
        match class {
            TissueClass::Fat => &self.fat,
            TissueClass::Muscle => &self.muscle,
            TissueClass::Bone => &self.bone,
        }
    }
}

impl fmt::Display for SliceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16} {:>10} {:>10} {:>10}",
            "Tissue", "Mean", "Std", "Pixels"
        )?;
        for class in TissueClass::ALL {
            let s = self.get(class);
            writeln!(
                f,
                "{:<16} {:>10.1} {:>10.1} {:>10}",
                class.name(),
                s.mean,
                s.std_dev,
                s.pixel_count
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    #[test]
    fn empty_mask_gives_zeros() {
        let field = ScalarField::from_fn(3, 3, |_, _| 42.0).unwrap();
        let stats = compute_stats(&field, &BinaryMask::new(3, 3)).unwrap();
        assert_eq!(stats, TissueStats::default());
    }

    #[test]
    fn single_pixel_mean_is_its_value() {
        let field = ScalarField::from_fn(3, 3, |x, y| if (x, y) == (1, 2) { -100.0 } else { 0.0 })
            .unwrap();
        let mask = BinaryMask::from_fn(3, 3, |x, y| (x, y) == (1, 2));
        let stats = compute_stats(&field, &mask).unwrap();
        assert_eq!(stats.pixel_count, 1);
        assert!((stats.mean - -100.0).abs() < 1e-9);
        assert!(stats.std_dev.abs() < 1e-9);
    }

    #[test]
    fn population_standard_deviation() {
        // Values 2, 4, 4, 4, 5, 5, 7, 9: mean 5, population std 2.
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let field = ScalarField::from_raw(4, 2, values).unwrap();
        let mask = BinaryMask::from_fn(4, 2, |_, _| true);
        let stats = compute_stats(&field, &mask).unwrap();
        assert_eq!(stats.pixel_count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-9);
        assert!((stats.std_dev - 2.0).abs() < 1e-9);
    }

    #[test]
    fn only_masked_pixels_contribute() {
        let field = ScalarField::from_fn(4, 1, |x, _| if x < 2 { 10.0 } else { 1000.0 }).unwrap();
        let mask = BinaryMask::from_fn(4, 1, |x, _| x < 2);
        let stats = compute_stats(&field, &mask).unwrap();
        assert_eq!(stats.pixel_count, 2);
        assert!((stats.mean - 10.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let field = ScalarField::from_fn(3, 3, |_, _| 0.0).unwrap();
        let err = compute_stats(&field, &BinaryMask::new(2, 3)).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }

    #[test]
    fn empty_mask_set_gives_zero_statistics() {
        let field = ScalarField::from_fn(5, 5, |_, _| -1000.0).unwrap();
        let masks = TissueMaskSet::empty(Dimensions {
            width: 5,
            height: 5,
        });
        let stats = SliceStatistics::compute(&field, &masks).unwrap();
        assert_eq!(stats, SliceStatistics::default());
    }

    #[test]
    fn display_lists_every_class() {
        let stats = SliceStatistics {
            muscle: TissueStats {
                pixel_count: 12,
                mean: 55.25,
                std_dev: 3.0,
            },
            ..SliceStatistics::default()
        };
        let table = stats.to_string();
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("Muscle / Tendon"));
        assert!(table.contains("55.2") || table.contains("55.3"));
        assert!(table.lines().nth(2).unwrap().trim_end().ends_with("12"));
    }
}
