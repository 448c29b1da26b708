//! Per-image processing records exposed by the controller.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{AutoFixResult, ComplianceReport, FaceDetection, FaceFeatures, ImageInfo, QualityMetrics};
use crate::error::{ErrorKind, ErrorSeverity, PipelineError};

/// An image handed to the controller.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// A file to load during the loading stage.
    Path(PathBuf),
    /// An already decoded image.
    Decoded(ImageInfo),
}

impl ImageInput {
    /// Path or identifier used in results and logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().into_owned(),
            Self::Decoded(info) => info.path.clone(),
        }
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<ImageInfo> for ImageInput {
    fn from(info: ImageInfo) -> Self {
        Self::Decoded(info)
    }
}

/// Stages of the per-image state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Decoding the input.
    ImageLoading,
    /// Locating the face.
    FaceDetection,
    /// Extracting landmarks and attributes.
    FaceAnalysis,
    /// Segmenting the background.
    BackgroundAnalysis,
    /// Scoring technical quality.
    QualityAssessment,
    /// Evaluating compliance rules.
    IcaoValidation,
    /// Applying corrections.
    AutoFix,
    /// Terminal success.
    Complete,
    /// Terminal failure.
    Failed,
}

impl ProcessingStage {
    /// Non-terminal stages in execution order.
    pub const PIPELINE: [Self; 7] = [
        Self::ImageLoading,
        Self::FaceDetection,
        Self::FaceAnalysis,
        Self::BackgroundAnalysis,
        Self::QualityAssessment,
        Self::IcaoValidation,
        Self::AutoFix,
    ];

    /// Progress percentage reported on entering the stage.
    #[must_use]
    pub const fn percent(self) -> u8 {
        match self {
            Self::ImageLoading => 0,
            Self::FaceDetection => 15,
            Self::FaceAnalysis => 30,
            Self::BackgroundAnalysis => 45,
            Self::QualityAssessment => 60,
            Self::IcaoValidation => 75,
            Self::AutoFix => 90,
            Self::Complete | Self::Failed => 100,
        }
    }

    /// Whether the session ends in this stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImageLoading => "image_loading",
            Self::FaceDetection => "face_detection",
            Self::FaceAnalysis => "face_analysis",
            Self::BackgroundAnalysis => "background_analysis",
            Self::QualityAssessment => "quality_assessment",
            Self::IcaoValidation => "icao_validation",
            Self::AutoFix => "auto_fix",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingProgress {
    /// Stage just entered.
    pub stage: ProcessingStage,
    /// Percentage complete.
    pub percent: u8,
    /// Short status line.
    pub message: String,
}

impl ProcessingProgress {
    /// Progress event for entering `stage`.
    #[must_use]
    pub fn entering(stage: ProcessingStage) -> Self {
        Self {
            stage,
            percent: stage.percent(),
            message: format!("Entering {stage}"),
        }
    }
}

/// Diagnostic record for one error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    /// Stage the error occurred in.
    pub stage: ProcessingStage,
    /// Error signature.
    pub kind: ErrorKind,
    /// Severity classification.
    pub severity: ErrorSeverity,
    /// Error text.
    pub message: String,
    /// Whether a recovery strategy ran.
    pub recovery_attempted: bool,
    /// Whether recovery produced a usable result.
    pub recovery_successful: bool,
    /// Session confidence when the error was recorded.
    pub confidence: f64,
}

impl ErrorContext {
    /// Record for `err` raised during `stage`.
    #[must_use]
    pub fn new(stage: ProcessingStage, err: &PipelineError, confidence: f64) -> Self {
        Self {
            stage,
            kind: err.kind(),
            severity: err.severity(),
            message: err.to_string(),
            recovery_attempted: false,
            recovery_successful: false,
            confidence,
        }
    }
}

/// Result of validating one image against one format.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Format the image was validated against.
    pub format: String,
    /// Compliance report.
    pub report: ComplianceReport,
    /// Quality metrics.
    pub quality: QualityMetrics,
    /// Detected face, if any.
    pub face: Option<FaceDetection>,
    /// Features of the detected face, if any.
    pub features: Option<FaceFeatures>,
    /// Confidence in the automated decision (0.0 to 1.0).
    pub confidence: f64,
    /// Whether a human should confirm the decision.
    pub requires_manual_review: bool,
}

/// Timings and counters for one `process_image` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageMetrics {
    /// Wall-clock time for the whole call.
    pub processing_ms: u64,
    /// Time spent per stage, in execution order.
    pub stage_timings_ms: Vec<(ProcessingStage, u64)>,
    /// Recovery attempts made.
    pub recovery_attempts: u32,
    /// Whether the validation result came from the cache.
    pub cache_hit: bool,
}

/// Outcome of one `process_image` call.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    /// Session identifier.
    pub session_id: String,
    /// Input path or identifier.
    pub path: String,
    /// False only on a critical or exhausted major error.
    pub success: bool,
    /// Validation result, when validation ran.
    pub validation_result: Option<ValidationResult>,
    /// Auto-fix result, when auto-fix ran.
    pub auto_fix_result: Option<AutoFixResult>,
    /// Timings and counters.
    pub processing_metrics: ImageMetrics,
    /// The error that failed the image.
    pub error_message: Option<String>,
    /// All errors recorded during the session.
    pub errors: Vec<ErrorContext>,
}

impl ProcessingResult {
    /// Whether the image needs human review, either failed or flagged.
    #[must_use]
    pub fn requires_manual_review(&self) -> bool {
        !self.success
            || self
                .validation_result
                .as_ref()
                .is_some_and(|v| v.requires_manual_review)
    }

    /// Report for the image as delivered: the post-correction report when
    /// corrections were kept, otherwise the validation report.
    #[must_use]
    pub fn final_report(&self) -> Option<&ComplianceReport> {
        self.auto_fix_result
            .as_ref()
            .filter(|f| !f.applied_corrections.is_empty())
            .map(|f| &f.after_report)
            .or_else(|| self.validation_result.as_ref().map(|v| &v.report))
    }

    /// Whether the image passes, after corrections if any were kept.
    #[must_use]
    pub fn passes(&self) -> bool {
        self.success && self.final_report().is_some_and(|r| r.passes_requirements)
    }

    /// Failing rules in the final report.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.final_report().map_or(0, ComplianceReport::violation_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_increase() {
        let percents: Vec<u8> = ProcessingStage::PIPELINE.iter().map(|s| s.percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
        assert_eq!(ProcessingStage::Complete.percent(), 100);
        assert!(ProcessingStage::Failed.is_terminal());
        assert!(!ProcessingStage::AutoFix.is_terminal());
    }

    #[test]
    fn test_input_label() {
        let input = ImageInput::from(PathBuf::from("/tmp/a.jpg"));
        assert_eq!(input.label(), "/tmp/a.jpg");
    }
}
