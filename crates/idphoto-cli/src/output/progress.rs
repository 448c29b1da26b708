//! Progress bar adapter using indicatif.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};
use idphoto_core::{BatchResult, ProcessingProgress, ProcessingResult, ProgressSink};
use tracing::debug;

/// Progress bar adapter for CLI output.
pub struct ProgressBar {
    bar: Option<IndicatifBar>,
    quiet: bool,
}

impl ProgressBar {
    /// Creates a new progress bar.
    ///
    /// # Arguments
    ///
    /// * `total` - Total number of items, if known
    /// * `quiet` - If true, suppress all output
    /// * `show_bar` - If true, show progress bar; otherwise show per-item status
    #[must_use]
    pub fn new(total: Option<u64>, quiet: bool, show_bar: bool) -> Self {
        if quiet {
            return Self {
                bar: None,
                quiet: true,
            };
        }

        let bar = if show_bar {
            let bar = total.map_or_else(IndicatifBar::new_spinner, IndicatifBar::new);

            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }

            Some(bar)
        } else {
            None
        };

        Self { bar, quiet }
    }

    /// Reports a finished image; prints problems when no bar is shown.
    pub fn report(&self, result: &ProcessingResult) {
        if self.quiet || self.bar.is_some() {
            return;
        }
        if let Some(message) = &result.error_message {
            eprintln!("{}: failed: {message}", result.path);
            return;
        }
        let violations = result.violation_count();
        if result.requires_manual_review() {
            eprintln!("{}: {violations} violation(s), manual review", result.path);
        } else if violations > 0 || !result.passes() {
            eprintln!("{}: {violations} violation(s)", result.path);
        }
    }

    /// Finishes the bar with a batch summary.
    pub fn finish(&self, batch: &BatchResult) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(format!(
                "Done: {} processed, {} failed",
                batch.total, batch.failed
            ));
        }
    }
}

impl ProgressSink for ProgressBar {
    fn on_progress(&self, session_id: &str, progress: &ProcessingProgress) {
        if self.quiet {
            return;
        }
        debug!("{session_id}: {} ({}%)", progress.stage, progress.percent);

        if let Some(bar) = &self.bar {
            if progress.stage.is_terminal() {
                bar.inc(1);
            } else {
                bar.set_message(progress.stage.as_str());
            }
        }
    }
}
