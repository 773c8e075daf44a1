//! Comparison diagnostics: per-variant stage timings and mask sizes.
//!
//! The library does not read the system clock itself; callers pass a
//! [`Clock`] so timing works the same on any platform and tests can use
//! a fake. Durations serialize as fractional seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::compare::{AdvancedSource, Variant};

/// Monotonic time source.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Clock that always reports zero elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _since: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// `Duration` as an `f64` number of seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration must be finite and non-negative"))
    }
}

/// `Option<Duration>` as a nullable number of seconds.
mod optional_duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| {
                    serde::de::Error::custom("duration must be finite and non-negative")
                })
            })
            .transpose()
    }
}

/// Timings and mask sizes for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDiagnostics {
    /// Which variant these numbers describe.
    pub variant: Variant,
    /// Visualization denoising.
    #[serde(with = "duration_serde")]
    pub denoise: Duration,
    /// Scalar-field smoothing.
    #[serde(with = "duration_serde")]
    pub smoothing: Duration,
    /// Segmentation.
    #[serde(with = "duration_serde")]
    pub segmentation: Duration,
    /// Overlay rendering.
    #[serde(with = "duration_serde")]
    pub overlay: Duration,
    /// Fat pixels.
    pub fat_pixels: usize,
    /// Muscle / tendon pixels.
    pub muscle_pixels: usize,
    /// Bone pixels.
    pub bone_pixels: usize,
}

impl VariantDiagnostics {
    /// Sum of the stage durations.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.denoise + self.smoothing + self.segmentation + self.overlay
    }
}

/// Diagnostics for one comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonDiagnostics {
    /// Slice width in pixels.
    pub width: u32,
    /// Slice height in pixels.
    pub height: u32,
    /// Windowing of the raw field.
    #[serde(with = "duration_serde")]
    pub windowing: Duration,
    /// Raw, classical and advanced, in that order.
    pub variants: Vec<VariantDiagnostics>,
    /// Statistics on the raw variant.
    #[serde(with = "duration_serde")]
    pub statistics: Duration,
    /// Denoiser behind the advanced variant.
    pub advanced_source: AdvancedSource,
    /// Non-local means baseline (denoise plus overlay), when one was made.
    #[serde(default, with = "optional_duration_serde")]
    pub nl_means_baseline: Option<Duration>,
    /// Wall-clock duration of the whole comparison.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl ComparisonDiagnostics {
    /// Multi-line summary: run header, then one timing row per variant.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Comparison Diagnostics\n{}", "=".repeat(60)));
        lines.push(format!(
            "Slice: {}x{}  |  Advanced: {}",
            self.width, self.height, self.advanced_source
        ));
        lines.push(format!(
            "Total duration: {:.3}ms (windowing {:.3}ms, statistics {:.3}ms)",
            duration_ms(self.total_duration),
            duration_ms(self.windowing),
            duration_ms(self.statistics),
        ));
        if let Some(baseline) = self.nl_means_baseline {
            lines.push(format!(
                "NL-means baseline: {:.3}ms",
                duration_ms(baseline)
            ));
        }
        lines.push(String::new());

        lines.push(format!(
            "{:<10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>8} {:>8}",
            "Variant", "Denoise", "Smooth", "Segment", "Overlay", "Fat", "Muscle", "Bone"
        ));
        lines.push("-".repeat(80));
        for v in &self.variants {
            lines.push(format!(
                "{:<10} {:>8.3}ms {:>8.3}ms {:>8.3}ms {:>8.3}ms {:>8} {:>8} {:>8}",
                v.variant.to_string(),
                duration_ms(v.denoise),
                duration_ms(v.smoothing),
                duration_ms(v.segmentation),
                duration_ms(v.overlay),
                v.fat_pixels,
                v.muscle_pixels,
                v.bone_pixels,
            ));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> ComparisonDiagnostics {
        ComparisonDiagnostics {
            width: 64,
            height: 32,
            windowing: Duration::from_micros(250),
            variants: vec![VariantDiagnostics {
                variant: Variant::Classical,
                denoise: Duration::from_millis(2),
                smoothing: Duration::from_millis(1),
                segmentation: Duration::from_millis(5),
                overlay: Duration::from_millis(3),
                fat_pixels: 10,
                muscle_pixels: 20,
                bone_pixels: 30,
            }],
            statistics: Duration::from_micros(100),
            advanced_source: AdvancedSource::NonLocalMeans,
            nl_means_baseline: None,
            total_duration: Duration::from_millis(12),
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        assert!((duration_ms(Duration::from_micros(1500)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn variant_total_sums_stages() {
        assert_eq!(sample().variants[0].total(), Duration::from_millis(11));
    }

    #[test]
    fn report_mentions_variants_and_source() {
        let report = sample().report();
        assert!(report.contains("64x32"));
        assert!(report.contains("Classical"));
        assert!(report.contains("NL-means"));
        assert!(report.contains("12.000ms"));
    }

    #[test]
    fn json_round_trip() {
        let diag = sample();
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"total_duration\":0.012"));
        let back: ComparisonDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.variants[0].fat_pixels, 10);
        assert_eq!(back.advanced_source, diag.advanced_source);
        let drift = back.total_duration.abs_diff(diag.total_duration);
        assert!(drift < Duration::from_micros(1), "drift {drift:?}");
    }

    #[test]
    fn baseline_timing_is_optional() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"nl_means_baseline\":null"));
        assert!(!sample().report().contains("baseline"));

        let mut diag = sample();
        diag.nl_means_baseline = Some(Duration::from_millis(4));
        assert!(diag.report().contains("NL-means baseline: 4.000ms"));
        let back: ComparisonDiagnostics =
            serde_json::from_str(&serde_json::to_string(&diag).unwrap()).unwrap();
        assert!(back.nl_means_baseline.is_some());

        let legacy = json.replace("\"nl_means_baseline\":null,", "");
        let parsed: ComparisonDiagnostics = serde_json::from_str(&legacy).unwrap();
        assert!(parsed.nl_means_baseline.is_none());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = serde_json::to_string(&sample())
            .unwrap()
            .replace("\"total_duration\":0.012", "\"total_duration\":-1.0");
        assert!(serde_json::from_str::<ComparisonDiagnostics>(&json).is_err());
    }

    #[test]
    fn null_clock_reports_zero() {
        let clock = NullClock;
        assert_eq!(clock.elapsed(&clock.now()), Duration::ZERO);
    }
}
