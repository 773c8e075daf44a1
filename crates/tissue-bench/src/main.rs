//! tissue-bench: run the denoiser comparison on a CT slice from disk.
//!
//! Loads a calibrated slice, segments it under three denoising strategies
//! and writes the denoised images, overlays and statistics to an output
//! directory. Useful for:
//!
//! - Checking how much each denoiser changes the tissue masks
//! - Tuning thresholds, window and overlay via `--config-json`
//! - Measuring per-variant stage durations
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tissue-bench -- [OPTIONS] <SLICE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod load;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use tissue_pipeline::diagnostics::Clock;
use tissue_pipeline::window::normalize_min_max;
use tissue_pipeline::{
    BlendMode, OverlayConfig, PipelineConfig, ResidualDenoiser, ScalarField, TechniqueConfig,
    TechniqueGallery, Window,
};

/// Default calibration lower bound for PNG input.
const DEFAULT_MIN_VALUE: f32 = -1024.0;
/// Default calibration upper bound for PNG input.
const DEFAULT_MAX_VALUE: f32 = 3071.0;

/// Tissue segmentation and denoiser comparison for CT slices.
///
/// Segments the slice into fat, muscle / tendon and bone three times
/// (raw, Gaussian-denoised, residual-model or NL-means denoised) and
/// writes the results side by side.
#[derive(Parser)]
#[command(name = "tissue-bench", version)]
struct Cli {
    /// Slice to process: a grayscale PNG, or raw f32 with `--raw`.
    slice_path: PathBuf,

    /// Treat the input as headerless little-endian f32 of this size.
    #[arg(long, value_name = "WxH", value_parser = load::parse_dimensions)]
    raw: Option<(u32, u32)>,

    /// Calibrated value of the lowest PNG code.
    #[arg(long, default_value_t = DEFAULT_MIN_VALUE, allow_hyphen_values = true)]
    min_value: f32,

    /// Calibrated value of the highest PNG code.
    #[arg(long, default_value_t = DEFAULT_MAX_VALUE, allow_hyphen_values = true)]
    max_value: f32,

    /// Residual denoising model (ONNX). Falls back to NL-means if absent.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory for the output images.
    #[arg(long, short, default_value = "output")]
    output_dir: PathBuf,

    /// Display window level.
    #[arg(long, default_value_t = Window::DEFAULT_CENTER, allow_hyphen_values = true)]
    window_center: f32,

    /// Display window width.
    #[arg(long, default_value_t = Window::DEFAULT_WIDTH)]
    window_width: f32,

    /// Overlay opacity (0.0-1.0).
    #[arg(long, default_value_t = OverlayConfig::DEFAULT_ALPHA)]
    alpha: f32,

    /// How class colors are combined with the image.
    #[arg(long, value_enum, default_value_t = Blend::Over)]
    blend: Blend,

    /// Do not draw mask outlines.
    #[arg(long)]
    no_outline: bool,

    /// Also write the technique gallery images.
    #[arg(long)]
    gallery: bool,

    /// Skip writing images; only print statistics and diagnostics.
    #[arg(long)]
    dry_run: bool,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, the window and overlay flags are ignored. The JSON
    /// must be a valid `PipelineConfig` serialization; missing fields use
    /// their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log filter, e.g. `info` or `tissue_pipeline=debug`. `RUST_LOG`
    /// takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Overlay blend mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Blend {
    /// Standard alpha compositing.
    Over,
    /// Saturating addition of the tinted color.
    Additive,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        window: Window::new(cli.window_center, cli.window_width),
        overlay: OverlayConfig {
            alpha: cli.alpha,
            blend_mode: match cli.blend {
                Blend::Over => BlendMode::Over,
                Blend::Additive => BlendMode::Additive,
            },
            outline: !cli.no_outline,
            ..OverlayConfig::default()
        },
        ..PipelineConfig::default()
    })
}

fn load_field(cli: &Cli) -> Result<ScalarField, String> {
    let bytes = std::fs::read(&cli.slice_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.slice_path.display()))?;
    let field = match cli.raw {
        Some((width, height)) => load::field_from_raw(&bytes, width, height),
        None => load::field_from_png(&bytes, cli.min_value, cli.max_value),
    };
    field.map_err(|e| format!("Error loading {}: {e}", cli.slice_path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match flexi_logger::Logger::try_with_env_or_str(&cli.log_level)
        .and_then(|logger| logger.log_to_stderr().start())
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error initializing logger: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            error!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let field = match load_field(&cli) {
        Ok(f) => f,
        Err(msg) => {
            error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let (lo, hi) = field.min_max();
    info!(
        "Slice: {} ({}x{}, values {lo:.1}..{hi:.1})",
        cli.slice_path.display(),
        field.width(),
        field.height(),
    );

    let denoiser = cli
        .model
        .as_deref()
        .and_then(ResidualDenoiser::load_or_warn);

    let (result, diagnostics) = match tissue_pipeline::compare_with_diagnostics(
        &field,
        &config,
        denoiser.as_ref(),
        &StdClock,
    ) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", diagnostics.report());
        println!();
        println!("{}", result.statistics);
    }

    if cli.dry_run {
        return ExitCode::SUCCESS;
    }

    match output::write_comparison(&cli.output_dir, &result) {
        Ok(paths) => info!(
            "Wrote {} files to {}",
            paths.len(),
            cli.output_dir.display()
        ),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    let minmax = normalize_min_max(&field);
    if let Err(e) = output::write_gray(&cli.output_dir, "0_field_minmax.png", &minmax) {
        warn!("{e}");
    }

    if cli.gallery {
        let base = &result.variants[0].visualization;
        let written = TechniqueGallery::build(base, &TechniqueConfig::default())
            .map_err(|e| e.to_string())
            .and_then(|g| output::write_gallery(&cli.output_dir, &g).map_err(|e| e.to_string()));
        match written {
            Ok(paths) => info!("Wrote {} gallery images", paths.len()),
            Err(e) => {
                error!("Gallery error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
