//! Check command - validate photos against a photo standard.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use idphoto_adapters::{
    default_corrections, BorderColorSegmenter, FsImageLoader, FsImageSource, SidecarFaceDetector,
};
use idphoto_core::{
    AutoFixConfig, BatchResult, ControllerConfig, CountryVariation, ImageInput, ImageSource,
    ProcessingController, ProcessingOptions, ProcessingResult, ProgressSink, QualityConfig,
    ResultOutput,
};
use tracing::{debug, info};

use super::ExitCode;
use crate::config::AppConfig;
use crate::output::{JsonOutput, ProgressBar};

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per line)
    #[default]
    Jsonl,
    /// Single JSON array
    Json,
}

/// Hardcoded default values.
mod defaults {
    pub const STANDARD: &str = "ICAO";
    pub const SEGMENT_TOLERANCE: f32 = 30.0;
}

/// Parse and validate a photo standard name.
fn parse_standard(s: &str) -> Result<String, String> {
    s.parse::<CountryVariation>().map(|v| v.name().to_string())
}

/// Parse and validate a compliance threshold (0-100).
fn parse_pass_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in 0..=100"))
    }
}

/// Shared arguments for photo validation.
#[derive(Args, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct CheckArgs {
    /// Files or directories to check
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Photo standard: ICAO, ICS-UAE or US
    #[arg(short, long, value_parser = parse_standard)]
    pub standard: Option<String>,

    /// Apply automatic corrections to fixable issues
    #[arg(long)]
    pub auto_fix: bool,

    /// Write corrected images into this directory (implies --auto-fix)
    #[arg(long, value_name = "DIR")]
    pub fixed_dir: Option<PathBuf>,

    /// Worker threads for batch processing
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Per-stage time budget in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,

    /// Compliance score (0-100) required to pass
    #[arg(long, value_parser = parse_pass_threshold)]
    pub pass_threshold: Option<f64>,

    /// Disable the validation result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output (only affects --format json)
    #[arg(long)]
    pub pretty: bool,

    /// Merged config (populated by `with_config`, not from CLI).
    #[arg(skip)]
    config: Option<AppConfig>,
}

impl CheckArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (in accessor methods)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if !args.recursive {
            args.recursive = config.general.recursive.unwrap_or(false);
        }
        if args.standard.is_none() {
            args.standard = config
                .general
                .standard
                .as_deref()
                .and_then(|s| parse_standard(s).ok());
        }

        if !args.auto_fix {
            args.auto_fix = config.autofix.enabled.unwrap_or(false);
        }
        if args.fixed_dir.is_none() {
            args.fixed_dir.clone_from(&config.output.fixed_dir);
        }

        args.workers = args.workers.or_else(|| {
            config
                .pipeline
                .workers
                .and_then(|w| u16::try_from(w).ok())
                .filter(|w| *w > 0)
        });
        args.timeout_ms = args
            .timeout_ms
            .or(config.pipeline.stage_timeout_ms.filter(|t| *t > 0));
        args.pass_threshold = args.pass_threshold.or(config.pipeline.pass_threshold);
        if !args.no_cache {
            args.no_cache = config.pipeline.cache == Some(false);
        }

        if args.format.is_none() {
            args.format = config
                .output
                .format
                .as_ref()
                .and_then(|s| match s.as_str() {
                    "json" => Some(OutputFormat::Json),
                    "jsonl" => Some(OutputFormat::Jsonl),
                    _ => None,
                });
        }
        if !args.pretty {
            args.pretty = config.output.pretty.unwrap_or(false);
        }
        if !args.progress {
            args.progress = config.output.progress.unwrap_or(false);
        }

        args.config = Some(config.clone());

        args
    }

    /// Photo standard with fallback to ICAO.
    fn standard(&self) -> &str {
        self.standard.as_deref().unwrap_or(defaults::STANDARD)
    }

    /// Whether auto-fix runs, either requested or implied by `--fixed-dir`.
    fn auto_fix(&self) -> bool {
        self.auto_fix || self.fixed_dir.is_some()
    }

    /// Get output format with fallback to JSONL.
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or(OutputFormat::Jsonl)
    }

    /// Controller settings from the merged arguments and config.
    fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        let config = self.config.clone().unwrap_or_default();

        let quality_defaults = QualityConfig::default();
        let quality = QualityConfig {
            minimum_overall: config
                .quality
                .minimum_overall
                .unwrap_or(quality_defaults.minimum_overall),
            min_width: config.quality.min_width.unwrap_or(quality_defaults.min_width),
            min_height: config
                .quality
                .min_height
                .unwrap_or(quality_defaults.min_height),
            ..quality_defaults
        };

        let autofix_defaults = AutoFixConfig::default();
        let autofix = AutoFixConfig {
            quality_tolerance: config
                .autofix
                .quality_tolerance
                .unwrap_or(autofix_defaults.quality_tolerance),
            conservative_strength: config
                .autofix
                .conservative_strength
                .unwrap_or(autofix_defaults.conservative_strength),
            ..autofix_defaults
        };

        ControllerConfig {
            workers: self.workers.map_or(defaults.workers, usize::from),
            stage_timeout_ms: self.timeout_ms.or(defaults.stage_timeout_ms),
            cache_enabled: !self.no_cache,
            min_face_confidence: config
                .pipeline
                .min_face_confidence
                .unwrap_or(defaults.min_face_confidence),
            pass_threshold: self.pass_threshold,
            quality,
            autofix,
            ..defaults
        }
    }

    /// Backdrop tolerance for the segmenter.
    fn segment_tolerance(&self) -> f32 {
        self.config
            .as_ref()
            .and_then(|c| c.segmentation.tolerance)
            .unwrap_or(defaults::SEGMENT_TOLERANCE)
    }
}

/// Result of running the check command.
#[allow(dead_code)] // Fields exposed for programmatic use
pub struct CheckResult {
    /// Number of images processed.
    pub processed: usize,
    /// Number of images that failed processing.
    pub failed: usize,
    /// Number of images that do not pass or need review.
    pub with_issues: usize,
    /// Exit code.
    pub exit_code: ExitCode,
}

/// Run the check command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &CheckArgs) -> Result<CheckResult> {
    info!("Running check command on {} paths", args.paths.len());

    if args.paths.is_empty() {
        anyhow::bail!("No paths specified");
    }

    let standard = args.standard().to_string();
    let config = args.controller_config();
    config.validate().map_err(anyhow::Error::msg)?;
    debug!("Controller config: {config:?}");

    let source = FsImageSource::new(args.paths.clone(), args.recursive);
    let inputs: Vec<ImageInput> = source.inputs().collect();
    let total = inputs.len();

    let show_progress = !args.quiet && (args.progress || std::io::stderr().is_terminal());
    let progress = Arc::new(ProgressBar::new(Some(total as u64), args.quiet, show_progress));

    let controller = build_controller(args, config, Arc::clone(&progress) as Arc<dyn ProgressSink>)?;
    let output = JsonOutput::stdout(standard.clone());

    let options = ProcessingOptions {
        auto_fix: args.auto_fix(),
    };
    let batch = controller.batch_process(inputs, &standard, &options);

    write_results(&batch, &output, &progress, args)?;
    progress.finish(&batch);

    if let Some(dir) = &args.fixed_dir {
        save_fixed(&batch.results, dir)?;
    }

    let with_issues = batch
        .results
        .iter()
        .filter(|r| has_issues(r))
        .count();
    info!(
        "{} processed, {} failed, {with_issues} with issues",
        batch.total, batch.failed
    );

    let exit_code = if with_issues > 0 {
        ExitCode::IssuesFound
    } else {
        ExitCode::Success
    };

    Ok(CheckResult {
        processed: batch.total,
        failed: batch.failed,
        with_issues,
        exit_code,
    })
}

/// Whether a result fails, needs review, or still violates any rule.
fn has_issues(result: &ProcessingResult) -> bool {
    !result.passes() || result.requires_manual_review() || result.violation_count() > 0
}

/// Wire the filesystem adapters into a controller.
fn build_controller(
    args: &CheckArgs,
    config: ControllerConfig,
    progress: Arc<dyn ProgressSink>,
) -> Result<ProcessingController> {
    ProcessingController::builder(Arc::new(FsImageLoader), Arc::new(SidecarFaceDetector::new()))
        .segmenter(Arc::new(BorderColorSegmenter::new(args.segment_tolerance())))
        .corrections(default_corrections())
        .progress(progress)
        .config(config)
        .build()
}

/// Write results in the requested format.
fn write_results(
    batch: &BatchResult,
    output: &JsonOutput,
    progress: &ProgressBar,
    args: &CheckArgs,
) -> Result<()> {
    for result in &batch.results {
        progress.report(result);
        if matches!(args.format(), OutputFormat::Jsonl) {
            output.write(result)?;
        }
    }

    if matches!(args.format(), OutputFormat::Json) {
        output.write_array(&batch.results, args.pretty)?;
    }

    output.flush()
}

/// Save corrected images as `<stem>.fixed.png` in `dir`.
fn save_fixed(results: &[ProcessingResult], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for result in results {
        let Some(fixed) = result
            .auto_fix_result
            .as_ref()
            .filter(|f| !f.applied_corrections.is_empty())
            .and_then(|f| f.corrected_image.as_ref())
        else {
            continue;
        };
        let stem = Path::new(&result.path)
            .file_stem()
            .map_or_else(|| result.session_id.clone(), |s| s.to_string_lossy().into_owned());
        let target = dir.join(format!("{stem}.fixed.png"));
        fixed
            .image
            .save(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        info!("Wrote corrected image {}", target.display());
    }
    Ok(())
}
