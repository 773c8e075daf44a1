//! Tissue segmentation: calibrated field in, three disjoint masks out.
//!
//! # Algorithm
//!
//! 1. **Body mask**: `field > body_threshold`, closed, then interior
//!    holes filled so enclosed air (e.g. bowel gas) counts as body. A
//!    body smaller than `min_body_pixels` yields three empty masks.
//! 2. **Range thresholds**: each class is a closed intensity band
//!    (bone is unbounded above), intersected with the body.
//! 3. **Morphological cleanup**: bone: closing. Muscle: opening with the
//!    small disc, then closing with the large disc. Fat: opening.
//! 4. **Component filtering**: regions under the per-class minimum area
//!    are dropped; holes inside muscle are filled.
//! 5. **Priority resolution**: [`resolve_priority`] reduces the
//!    overlapping candidates to disjoint masks, bone > muscle > fat.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::morphology;
use crate::types::{BinaryMask, PipelineError, ScalarField, TissueMaskSet};

/// Closed intensity interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityBand {
    /// Inclusive lower bound.
    pub low: f32,
    /// Inclusive upper bound.
    pub high: f32,
}

impl IntensityBand {
    /// Create a band.
    #[must_use]
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// Whether `value` lies inside the band.
    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        (self.low..=self.high).contains(&value)
    }
}

/// Segmentation constants.
///
/// Radii are in pixels and describe disc structuring elements; the
/// defaults are tuned for ~512x512 slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Pixels strictly above this value belong to the body.
    pub body_threshold: f32,
    /// Closing radius applied to the raw body mask.
    pub body_close_radius: u8,
    /// Bodies with fewer pixels are treated as an empty slice.
    pub min_body_pixels: usize,
    /// Fat intensity band.
    pub fat_band: IntensityBand,
    /// Muscle / tendon intensity band.
    pub muscle_band: IntensityBand,
    /// Bone is everything at or above this value.
    pub bone_threshold: f32,
    /// Small disc: bone closing, muscle opening, fat opening.
    pub small_radius: u8,
    /// Large disc: muscle closing.
    pub large_radius: u8,
    /// Erosion applied to bone before it clears muscle and fat.
    pub bone_erosion_radius: u8,
    /// Minimum fat component area in pixels.
    pub min_fat_area: usize,
    /// Minimum muscle component area in pixels.
    pub min_muscle_area: usize,
    /// Minimum bone component area in pixels.
    pub min_bone_area: usize,
}

impl SegmentationConfig {
    /// Default body threshold.
    pub const DEFAULT_BODY_THRESHOLD: f32 = -300.0;
    /// Default fat band.
    pub const DEFAULT_FAT_BAND: IntensityBand = IntensityBand::new(-190.0, -30.0);
    /// Default muscle band.
    pub const DEFAULT_MUSCLE_BAND: IntensityBand = IntensityBand::new(10.0, 120.0);
    /// Default bone threshold.
    pub const DEFAULT_BONE_THRESHOLD: f32 = 200.0;

    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        for (name, band) in [("fat", self.fat_band), ("muscle", self.muscle_band)] {
            if !(band.low.is_finite() && band.high.is_finite() && band.low <= band.high) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} band [{}, {}] is empty or not finite",
                    band.low, band.high
                )));
            }
        }
        if !(self.body_threshold.is_finite() && self.bone_threshold.is_finite()) {
            return Err(PipelineError::InvalidConfig(
                "body and bone thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            body_threshold: Self::DEFAULT_BODY_THRESHOLD,
            body_close_radius: 2,
            min_body_pixels: 64,
            fat_band: Self::DEFAULT_FAT_BAND,
            muscle_band: Self::DEFAULT_MUSCLE_BAND,
            bone_threshold: Self::DEFAULT_BONE_THRESHOLD,
            small_radius: 1,
            large_radius: 2,
            bone_erosion_radius: 1,
            min_fat_area: 10,
            min_muscle_area: 25,
            min_bone_area: 40,
        }
    }
}

/// Detailed segmentation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    /// Closed, hole-filled body mask.
    pub body: BinaryMask,
    /// Disjoint fat / muscle / bone masks.
    pub masks: TissueMaskSet,
    /// `true` if the body was below the minimum size and the tissue
    /// masks were left empty.
    pub degenerate: bool,
}

/// Deterministic threshold-and-cleanup segmenter.
#[derive(Debug, Clone, Default)]
pub struct TissueSegmenter {
    config: SegmentationConfig,
}

impl TissueSegmenter {
    /// Create a segmenter with the given constants.
    #[must_use]
    pub const fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// The constants in use.
    #[must_use]
    pub const fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segment `field` into disjoint fat, muscle and bone masks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the constants are
    /// inconsistent.
    pub fn segment(&self, field: &ScalarField) -> Result<TissueMaskSet, PipelineError> {
        self.segment_detailed(field).map(|s| s.masks)
    }

    /// Segment `field`, also returning the body mask.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the constants are
    /// inconsistent.
    pub fn segment_detailed(&self, field: &ScalarField) -> Result<Segmentation, PipelineError> {
        self.config.validate()?;
        let cfg = &self.config;

        // 1. Body.
        let body = BinaryMask::threshold(field, |v| v > cfg.body_threshold);
        let body = morphology::fill_holes(&morphology::close(&body, cfg.body_close_radius))?;
        let body_pixels = body.count();
        if body_pixels < cfg.min_body_pixels {
            debug!(
                "body covers {body_pixels} px (< {}), returning empty masks",
                cfg.min_body_pixels
            );
            return Ok(Segmentation {
                masks: TissueMaskSet::empty(field.dimensions()),
                body,
                degenerate: true,
            });
        }

        // 2. Range thresholds inside the body.
        let fat = BinaryMask::threshold(field, |v| cfg.fat_band.contains(v)).and(&body)?;
        let muscle = BinaryMask::threshold(field, |v| cfg.muscle_band.contains(v)).and(&body)?;
        let bone = BinaryMask::threshold(field, |v| v >= cfg.bone_threshold).and(&body)?;

        // 3. Morphological cleanup.
        let bone = morphology::close(&bone, cfg.small_radius);
        let muscle = morphology::close(
            &morphology::open(&muscle, cfg.small_radius),
            cfg.large_radius,
        );
        let fat = morphology::open(&fat, cfg.small_radius);

        // 4. Component filtering.
        let candidates = TissueMaskSet {
            fat: morphology::remove_small_components(&fat, cfg.min_fat_area),
            muscle: morphology::fill_holes(&morphology::remove_small_components(
                &muscle,
                cfg.min_muscle_area,
            ))?,
            bone: morphology::remove_small_components(&bone, cfg.min_bone_area),
        };

        // 5. Priority resolution.
        let masks = resolve_priority(&candidates, cfg.bone_erosion_radius)?;
        debug!(
            "segmented body={body_pixels} fat={} muscle={} bone={}",
            masks.fat.count(),
            masks.muscle.count(),
            masks.bone.count()
        );

        Ok(Segmentation {
            body,
            masks,
            degenerate: false,
        })
    }
}

/// Reduce overlapping candidate masks to disjoint masks.
///
/// Priority is bone > muscle > fat:
///
/// - muscle is cleared where the eroded bone is set;
/// - fat is cleared where the eroded bone is set;
/// - muscle is cleared where the full bone is set;
/// - fat is cleared where the resolved muscle or the full bone is set.
///
/// Bone is returned unchanged. Applying the reduction to its own output
/// returns the same masks.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the three candidates
/// differ in size.
pub fn resolve_priority(
    candidates: &TissueMaskSet,
    bone_erosion_radius: u8,
) -> Result<TissueMaskSet, PipelineError> {
    candidates.check_dimensions()?;
    let bone = &candidates.bone;
    let bone_core = morphology::erode(bone, bone_erosion_radius);

    let muscle = candidates.muscle.and_not(&bone_core)?;
    let fat = candidates.fat.and_not(&bone_core)?;
    let muscle = muscle.and_not(bone)?;
    let fat = fat.and_not(&muscle)?.and_not(bone)?;

    Ok(TissueMaskSet {
        fat,
        muscle,
        bone: bone.clone(),
    })
}

/// Segment with default constants.
///
/// # Errors
///
/// See [`TissueSegmenter::segment`].
pub fn segment(field: &ScalarField) -> Result<TissueMaskSet, PipelineError> {
    TissueSegmenter::default().segment(field)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::TissueClass;

    /// Config with every cleanup step disabled, so single pixels survive.
    fn permissive() -> SegmentationConfig {
        SegmentationConfig {
            body_close_radius: 0,
            min_body_pixels: 1,
            small_radius: 0,
            large_radius: 0,
            bone_erosion_radius: 1,
            min_fat_area: 1,
            min_muscle_area: 1,
            min_bone_area: 1,
            ..SegmentationConfig::default()
        }
    }

    /// 64x64 "phantom": air outside a disc of fat, a muscle ring inside,
    /// and a bone core, with a gas pocket in the fat.
    fn phantom() -> ScalarField {
        ScalarField::from_fn(64, 64, |x, y| {
            let dx = f32::from(u16::try_from(x).unwrap()) - 32.0;
            let dy = f32::from(u16::try_from(y).unwrap()) - 32.0;
            let r = dx.hypot(dy);
            if r > 28.0 {
                -1000.0
            } else if (x, y) == (32, 7) {
                -900.0 // gas pocket inside the body
            } else if r > 20.0 {
                -100.0
            } else if r > 8.0 {
                60.0
            } else {
                700.0
            }
        })
        .unwrap()
    }

    /// Values that sit exactly on a threshold or band edge.
    const EDGES: [f32; 8] = [-1024.0, -300.0, -190.0, -30.0, 10.0, 120.0, 200.0, 3000.0];

    /// Deterministic noisy slice: xorshift values over -1024..=3000 with
    /// every fourth pixel snapped to a band edge.
    fn noisy_field(seed: u32, width: u32, height: u32) -> ScalarField {
        let mut state = seed.max(1);
        ScalarField::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state % 4 == 0 {
                EDGES[(state / 4) as usize % EDGES.len()]
            } else {
                f32::from(u16::try_from(state % 4025).unwrap()) - 1024.0
            }
        })
        .unwrap()
    }

    /// Keep pixels that belong to some tissue mask; everything else
    /// becomes air.
    fn tissue_only(field: &ScalarField, masks: &TissueMaskSet) -> ScalarField {
        ScalarField::from_fn(field.width(), field.height(), |x, y| {
            if masks.iter().any(|(_, m)| m.contains(x, y)) {
                field.get(x, y)
            } else {
                -1024.0
            }
        })
        .unwrap()
    }

    #[test]
    fn masks_are_disjoint_on_noisy_fields() {
        for config in [SegmentationConfig::default(), permissive()] {
            let segmenter = TissueSegmenter::new(config);
            for seed in 1..=12 {
                let field = noisy_field(seed * 7919, 24 + seed, 20);
                let masks = segmenter.segment(&field).unwrap();
                assert!(masks.is_disjoint(), "seed {seed}");
                assert_eq!(masks.check_dimensions().unwrap(), field.dimensions());
            }
        }
    }

    #[test]
    fn band_edge_values_land_in_one_class() {
        let field = ScalarField::from_fn(8, 1, |x, _| EDGES[x as usize]).unwrap();
        let masks = TissueSegmenter::new(permissive()).segment(&field).unwrap();
        assert!(masks.is_disjoint());
        // -190 and -30 are fat, 10 and 120 muscle, 200 and 3000 bone.
        assert!(masks.fat.contains(2, 0) && masks.fat.contains(3, 0));
        assert!(masks.muscle.contains(4, 0) && masks.muscle.contains(5, 0));
        assert!(masks.bone.contains(6, 0) && masks.bone.contains(7, 0));
        assert!(!masks.iter().any(|(_, m)| m.contains(1, 0)));
    }

    #[test]
    fn resegmenting_tissue_only_field_reproduces_masks() {
        let segmenter = TissueSegmenter::new(permissive());
        for seed in 1..=8 {
            let field = noisy_field(seed * 104_729, 20, 20);
            let masks = segmenter.segment(&field).unwrap();
            let again = segmenter.segment(&tissue_only(&field, &masks)).unwrap();
            assert_eq!(again, masks, "seed {seed}");
        }
        let field = phantom();
        let masks = segmenter.segment(&field).unwrap();
        assert_eq!(segmenter.segment(&tissue_only(&field, &masks)).unwrap(), masks);
    }

    #[test]
    fn minimal_field_assigns_one_pixel_per_class() {
        let mut values = vec![-1024.0; 16];
        values[0] = -100.0; // (0,0) fat
        values[3] = 50.0; // (3,0) muscle
        values[12] = 500.0; // (0,3) bone
        let field = ScalarField::from_raw(4, 4, values).unwrap();

        let seg = TissueSegmenter::new(permissive())
            .segment_detailed(&field)
            .unwrap();

        assert!(!seg.degenerate);
        assert_eq!(seg.body.count(), 3);
        assert_eq!(seg.masks.fat.iter_set().collect::<Vec<_>>(), vec![(0, 0)]);
        assert_eq!(seg.masks.muscle.iter_set().collect::<Vec<_>>(), vec![(3, 0)]);
        assert_eq!(seg.masks.bone.iter_set().collect::<Vec<_>>(), vec![(0, 3)]);
    }

    #[test]
    fn all_background_field_yields_empty_masks() {
        let field = ScalarField::from_fn(32, 32, |_, _| -1000.0).unwrap();
        let seg = TissueSegmenter::default().segment_detailed(&field).unwrap();
        assert!(seg.degenerate);
        assert!(seg.body.is_empty());
        assert!(seg.masks.is_empty());
        assert_eq!(seg.masks.dimensions(), field.dimensions());
    }

    #[test]
    fn small_body_is_degenerate() {
        let field = ScalarField::from_fn(32, 32, |x, y| {
            if x < 3 && y < 3 { 50.0 } else { -1000.0 }
        })
        .unwrap();
        let seg = TissueSegmenter::default().segment_detailed(&field).unwrap();
        assert!(seg.degenerate);
        assert!(seg.masks.is_empty());
    }

    #[test]
    fn phantom_masks_are_disjoint_and_populated() {
        let masks = segment(&phantom()).unwrap();
        assert!(masks.is_disjoint());
        for (class, mask) in masks.iter() {
            assert!(!mask.is_empty(), "{} mask is empty", class.name());
        }
        assert!(masks.bone.contains(32, 32));
        assert!(masks.muscle.contains(32, 18));
        assert!(masks.fat.contains(32, 9));
        assert!(!masks.get(TissueClass::Fat).contains(0, 0));
    }

    #[test]
    fn enclosed_gas_counts_as_body() {
        let seg = TissueSegmenter::default()
            .segment_detailed(&phantom())
            .unwrap();
        assert!(seg.body.contains(32, 7));
        assert!(!seg.body.contains(0, 0));
    }

    #[test]
    fn segmentation_is_deterministic() {
        let field = phantom();
        let a = segment(&field).unwrap();
        let b = segment(&field).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn resolution_is_stable_on_its_own_output() {
        let masks = segment(&phantom()).unwrap();
        let again =
            resolve_priority(&masks, SegmentationConfig::default().bone_erosion_radius).unwrap();
        assert_eq!(again, masks);
    }

    #[test]
    fn contested_pixels_go_to_bone_then_muscle() {
        // Muscle candidate covers the whole grid, bone a 5x5 block, fat
        // the left half: every contested pixel must resolve by priority.
        let (w, h) = (12, 12);
        let candidates = TissueMaskSet {
            fat: BinaryMask::from_fn(w, h, |x, _| x < 6),
            muscle: BinaryMask::from_fn(w, h, |_, _| true),
            bone: BinaryMask::from_fn(w, h, |x, y| (4..9).contains(&x) && (4..9).contains(&y)),
        };
        let resolved = resolve_priority(&candidates, 1).unwrap();

        assert!(resolved.is_disjoint());
        // Bone boundary pixel (muscle range, next to the eroded core).
        assert!(resolved.bone.contains(4, 6));
        assert!(!resolved.muscle.contains(4, 6));
        // Bone core.
        assert!(!resolved.muscle.contains(6, 6));
        // Muscle beats fat outside bone.
        assert!(resolved.muscle.contains(0, 0));
        assert!(!resolved.fat.contains(0, 0));
        assert!(resolved.fat.is_empty());
    }

    #[test]
    fn fat_survives_where_uncontested() {
        let (w, h) = (6, 6);
        let candidates = TissueMaskSet {
            fat: BinaryMask::from_fn(w, h, |x, _| x < 2),
            muscle: BinaryMask::from_fn(w, h, |x, _| x >= 4),
            bone: BinaryMask::new(w, h),
        };
        let resolved = resolve_priority(&candidates, 1).unwrap();
        assert_eq!(resolved.fat, candidates.fat);
        assert_eq!(resolved.muscle, candidates.muscle);
    }

    #[test]
    fn mismatched_candidates_are_rejected() {
        let candidates = TissueMaskSet {
            fat: BinaryMask::from_fn(4, 4, |_, _| true),
            muscle: BinaryMask::new(4, 4),
            bone: BinaryMask::from_fn(6, 6, |x, _| x < 3),
        };
        let result = resolve_priority(&candidates, 1);
        assert!(matches!(
            result,
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn inverted_band_is_rejected() {
        let config = SegmentationConfig {
            fat_band: IntensityBand::new(10.0, -10.0),
            ..SegmentationConfig::default()
        };
        let field = phantom();
        let result = TissueSegmenter::new(config).segment(&field);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn band_bounds_are_inclusive() {
        let band = IntensityBand::new(-190.0, -30.0);
        assert!(band.contains(-190.0));
        assert!(band.contains(-30.0));
        assert!(!band.contains(-29.9));
    }
}
