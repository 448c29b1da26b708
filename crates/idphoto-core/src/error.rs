//! Pipeline error taxonomy.
//!
//! Ports return `anyhow::Result`; the controller classifies those failures
//! into [`PipelineError`] so recovery can be keyed on a stable [`ErrorKind`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CorrectionKind, ProcessingStage};

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Classified pipeline failure.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Missing, unreadable or unsupported input. Never retried.
    #[error("Input error: {0}")]
    Input(String),

    /// No face, or no face above the confidence floor.
    #[error("Face detection failed: {0}")]
    Detection(String),

    /// Memory or I/O exhaustion.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Rule confidences disagree too much for an unattended decision.
    #[error("Inconsistent validation: {0}")]
    ValidationInconsistency(String),

    /// A correction made the image worse and was rolled back.
    #[error("Correction {correction} regressed compliance by {delta:.1} points")]
    AutoFixRegression {
        /// The rejected correction.
        correction: CorrectionKind,
        /// Score change that triggered the rollback (negative).
        delta: f64,
    },

    /// A long-running stage exceeded its time budget.
    #[error("Stage {stage} timed out after {timeout_ms} ms")]
    Timeout {
        /// The stage that timed out.
        stage: ProcessingStage,
        /// Configured budget.
        timeout_ms: u64,
    },

    /// Any other stage-logic fault.
    #[error("Stage {stage} failed: {message}")]
    Stage {
        /// The failing stage.
        stage: ProcessingStage,
        /// Underlying error text.
        message: String,
    },
}

/// Stable error signature used to key recovery strategies and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`PipelineError::Input`].
    Input,
    /// See [`PipelineError::Detection`].
    Detection,
    /// See [`PipelineError::Resource`].
    Resource,
    /// See [`PipelineError::ValidationInconsistency`].
    ValidationInconsistency,
    /// See [`PipelineError::AutoFixRegression`].
    AutoFixRegression,
    /// See [`PipelineError::Timeout`].
    Timeout,
    /// See [`PipelineError::Stage`].
    Stage,
}

impl ErrorKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Detection => "detection",
            Self::Resource => "resource",
            Self::ValidationInconsistency => "validation_inconsistency",
            Self::AutoFixRegression => "auto_fix_regression",
            Self::Timeout => "timeout",
            Self::Stage => "stage",
        }
    }
}

/// Impact of an error on the processing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Fails the image.
    Critical,
    /// Fails the image once recovery is exhausted.
    Major,
    /// Lowers confidence only.
    Warning,
}

impl PipelineError {
    /// Error signature.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Detection(_) => ErrorKind::Detection,
            Self::Resource(_) => ErrorKind::Resource,
            Self::ValidationInconsistency(_) => ErrorKind::ValidationInconsistency,
            Self::AutoFixRegression { .. } => ErrorKind::AutoFixRegression,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Stage { .. } => ErrorKind::Stage,
        }
    }

    /// Severity classification.
    ///
    /// Input and resource faults are critical, stage logic faults and
    /// timeouts are major, degraded results are warnings.
    #[must_use]
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Input(_) | Self::Resource(_) => ErrorSeverity::Critical,
            Self::Detection(_) | Self::Timeout { .. } | Self::Stage { .. } => ErrorSeverity::Major,
            Self::ValidationInconsistency(_) | Self::AutoFixRegression { .. } => {
                ErrorSeverity::Warning
            }
        }
    }

    /// Whether this error alone fails the image.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.severity(), ErrorSeverity::Warning)
    }

    /// Classifies a port failure raised during `stage`.
    ///
    /// A wrapped `PipelineError` is returned as is. I/O and allocation
    /// failures become [`PipelineError::Resource`]; undecodable images
    /// during loading become [`PipelineError::Input`].
    #[must_use]
    pub fn from_port(stage: ProcessingStage, err: anyhow::Error) -> Self {
        let err = match err.downcast::<Self>() {
            Ok(pipeline) => return pipeline,
            Err(err) => err,
        };

        for cause in err.chain() {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::NotFound {
                    return Self::Input(format!("{err:#}"));
                }
                return Self::Resource(format!("{err:#}"));
            }
            if cause.is::<std::collections::TryReserveError>() {
                return Self::Resource(format!("{err:#}"));
            }
            if let Some(img) = cause.downcast_ref::<image::ImageError>() {
                return match img {
                    image::ImageError::IoError(_) | image::ImageError::Limits(_) => {
                        Self::Resource(format!("{err:#}"))
                    }
                    _ if stage == ProcessingStage::ImageLoading => Self::Input(format!("{err:#}")),
                    _ => Self::Stage {
                        stage,
                        message: format!("{err:#}"),
                    },
                };
            }
        }

        Self::Stage {
            stage,
            message: format!("{err:#}"),
        }
    }
}
