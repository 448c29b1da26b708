//! Error classification, recovery strategies and confidence scoring.

use serde::Serialize;

use crate::domain::{ErrorContext, ProcessingStage};
use crate::error::{ErrorKind, ErrorSeverity, PipelineError};

/// What to do before retrying a failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Retry on a contrast-stretched copy; stronger on each attempt.
    EnhanceContrast,
    /// Retry on a copy scaled by the factor.
    Downscale(f32),
    /// Retry unchanged.
    Retry,
    /// Continue without this stage's output and flag for review.
    Degrade,
}

/// Action plus attempt budget for one `(stage, kind)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryStrategy {
    /// Recovery action.
    pub action: RecoveryAction,
    /// Attempts allowed before the original error is escalated.
    pub max_attempts: u32,
}

impl RecoveryStrategy {
    /// Strategy running `action` at most `max_attempts` times.
    #[must_use]
    pub const fn new(action: RecoveryAction, max_attempts: u32) -> Self {
        Self {
            action,
            max_attempts,
        }
    }
}

/// Stage-specific recovery and manual review policy.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    strategies: Vec<((ProcessingStage, ErrorKind), RecoveryStrategy)>,
    /// Confidence below which results are flagged.
    pub review_confidence: f64,
    /// Number of most recent errors searched for a critical one.
    pub critical_window: usize,
    /// Number of most recent errors counted for repeated major ones.
    pub recent_window: usize,
}

/// Kind a strategy is looked up under. A timeout is a stage failure that
/// ran out of time, so it shares the stage's strategy and attempt budget.
#[must_use]
pub(crate) const fn recovery_kind(kind: ErrorKind) -> ErrorKind {
    match kind {
        ErrorKind::Timeout => ErrorKind::Stage,
        other => other,
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        use ErrorKind as K;
        use ProcessingStage as S;
        use RecoveryAction as A;

        let enhance = RecoveryStrategy::new(A::EnhanceContrast, 3);
        let downscale = RecoveryStrategy::new(A::Downscale(0.5), 1);
        let degrade = RecoveryStrategy::new(A::Degrade, 1);

        let mut strategies = vec![
            ((S::ImageLoading, K::Resource), RecoveryStrategy::new(A::Retry, 1)),
            ((S::FaceDetection, K::Detection), enhance),
            ((S::FaceDetection, K::Stage), enhance),
            ((S::BackgroundAnalysis, K::Stage), degrade),
            ((S::IcaoValidation, K::ValidationInconsistency), degrade),
            ((S::AutoFix, K::Stage), degrade),
        ];
        for stage in [
            S::FaceDetection,
            S::FaceAnalysis,
            S::BackgroundAnalysis,
            S::QualityAssessment,
            S::IcaoValidation,
            S::AutoFix,
        ] {
            strategies.push(((stage, K::Resource), downscale));
        }

        Self {
            strategies,
            review_confidence: 0.7,
            critical_window: 10,
            recent_window: 5,
        }
    }
}

impl ErrorHandler {
    /// Creates a handler with the default strategy table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces (or adds) the strategy for `(stage, kind)`. Timeouts share
    /// the `Stage` entry.
    #[must_use]
    pub fn with_strategy(
        mut self,
        stage: ProcessingStage,
        kind: ErrorKind,
        strategy: RecoveryStrategy,
    ) -> Self {
        let kind = recovery_kind(kind);
        self.strategies.retain(|(key, _)| *key != (stage, kind));
        self.strategies.push(((stage, kind), strategy));
        self
    }

    /// Strategy for an error signature, if any.
    #[must_use]
    pub fn strategy(&self, stage: ProcessingStage, kind: ErrorKind) -> Option<RecoveryStrategy> {
        let kind = recovery_kind(kind);
        self.strategies
            .iter()
            .find(|(key, _)| *key == (stage, kind))
            .map(|(_, strategy)| *strategy)
    }

    /// Next action for `err` after `attempts` tries of the same signature,
    /// or `None` once the strategy is exhausted.
    ///
    /// Input errors are never retried.
    #[must_use]
    pub fn next_action(
        &self,
        stage: ProcessingStage,
        err: &PipelineError,
        attempts: u32,
    ) -> Option<RecoveryAction> {
        if err.kind() == ErrorKind::Input {
            return None;
        }
        self.strategy(stage, err.kind())
            .filter(|s| attempts < s.max_attempts)
            .map(|s| s.action)
    }

    /// Confidence in an automated result.
    ///
    /// Averages detector confidence and validation consistency and takes
    /// 0.1 off per accumulated error. Always within 0.0-1.0.
    #[must_use]
    pub fn confidence_score(
        detector_confidence: Option<f32>,
        consistency: f64,
        error_count: usize,
    ) -> f64 {
        let detector = detector_confidence.map_or(0.0, f64::from);
        let consistency = if consistency.is_finite() {
            consistency
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let penalty = 0.1 * error_count as f64;
        let raw = 0.5 * detector.clamp(0.0, 1.0) + 0.5 * consistency.clamp(0.0, 1.0) - penalty;
        raw.clamp(0.0, 1.0)
    }

    /// Whether a human should confirm the result.
    ///
    /// True when confidence is below the review threshold, when any error in
    /// the critical window is critical, or when two or more in the recent
    /// window are major.
    #[must_use]
    pub fn should_require_manual_review(&self, confidence: f64, errors: &[ErrorContext]) -> bool {
        if confidence < self.review_confidence {
            return true;
        }
        let last = |n: usize| &errors[errors.len().saturating_sub(n)..];
        let critical = last(self.critical_window)
            .iter()
            .any(|e| e.severity == ErrorSeverity::Critical);
        let major = last(self.recent_window)
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Major)
            .count();
        critical || major >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(severity: ErrorSeverity) -> ErrorContext {
        ErrorContext {
            stage: ProcessingStage::FaceDetection,
            kind: ErrorKind::Detection,
            severity,
            message: String::new(),
            recovery_attempted: true,
            recovery_successful: false,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_detection_gets_three_enhancement_attempts() {
        let handler = ErrorHandler::new();
        let err = PipelineError::Detection("no face".into());
        for attempt in 0..3 {
            assert_eq!(
                handler.next_action(ProcessingStage::FaceDetection, &err, attempt),
                Some(RecoveryAction::EnhanceContrast)
            );
        }
        assert_eq!(handler.next_action(ProcessingStage::FaceDetection, &err, 3), None);
    }

    #[test]
    fn test_resource_downscales_once() {
        let handler = ErrorHandler::new();
        let err = PipelineError::Resource("out of memory".into());
        assert_eq!(
            handler.next_action(ProcessingStage::QualityAssessment, &err, 0),
            Some(RecoveryAction::Downscale(0.5))
        );
        assert_eq!(handler.next_action(ProcessingStage::QualityAssessment, &err, 1), None);
    }

    #[test]
    fn test_timeout_recovers_like_stage_failure() {
        let handler = ErrorHandler::new();
        let timeout = |stage| PipelineError::Timeout {
            stage,
            timeout_ms: 10,
        };
        let failure = |stage| PipelineError::Stage {
            stage,
            message: "crashed".into(),
        };
        for stage in ProcessingStage::PIPELINE {
            assert_eq!(
                handler.strategy(stage, ErrorKind::Timeout),
                handler.strategy(stage, ErrorKind::Stage),
                "{stage}"
            );
            for attempt in 0..4 {
                assert_eq!(
                    handler.next_action(stage, &timeout(stage), attempt),
                    handler.next_action(stage, &failure(stage), attempt),
                    "{stage} attempt {attempt}"
                );
            }
        }

        let handler = handler.with_strategy(
            ProcessingStage::FaceAnalysis,
            ErrorKind::Timeout,
            RecoveryStrategy::new(RecoveryAction::Retry, 2),
        );
        let stage = ProcessingStage::FaceAnalysis;
        assert_eq!(
            handler.next_action(stage, &failure(stage), 1),
            Some(RecoveryAction::Retry)
        );
        assert_eq!(handler.next_action(stage, &timeout(stage), 2), None);
    }

    #[test]
    fn test_input_is_never_retried() {
        let handler = ErrorHandler::new().with_strategy(
            ProcessingStage::ImageLoading,
            ErrorKind::Input,
            RecoveryStrategy::new(RecoveryAction::Retry, 5),
        );
        let err = PipelineError::Input("missing".into());
        assert_eq!(handler.next_action(ProcessingStage::ImageLoading, &err, 0), None);
    }

    #[test]
    fn test_confidence_bounds() {
        for detector in [None, Some(-1.0), Some(0.0), Some(0.5), Some(1.0), Some(7.0)] {
            for consistency in [f64::NAN, -3.0, 0.0, 0.4, 1.0, 9.0] {
                for errors in [0, 1, 3, 20] {
                    let c = ErrorHandler::confidence_score(detector, consistency, errors);
                    assert!((0.0..=1.0).contains(&c), "{detector:?} {consistency} {errors} -> {c}");
                }
            }
        }
        let c = ErrorHandler::confidence_score(Some(0.9), 0.9, 1);
        assert!((c - 0.8).abs() < 1e-6, "got {c}");
    }

    #[test]
    fn test_manual_review_rules() {
        let handler = ErrorHandler::new();
        assert!(handler.should_require_manual_review(0.69, &[]));
        assert!(!handler.should_require_manual_review(0.9, &[]));
        assert!(handler.should_require_manual_review(0.9, &[context(ErrorSeverity::Critical)]));
        assert!(!handler.should_require_manual_review(0.9, &[context(ErrorSeverity::Major)]));
        assert!(handler.should_require_manual_review(
            0.9,
            &[context(ErrorSeverity::Major), context(ErrorSeverity::Major)]
        ));

    }

    #[test]
    fn test_critical_errors_are_remembered_longer_than_major() {
        let handler = ErrorHandler::new();
        let warnings = |n| (0..n).map(|_| context(ErrorSeverity::Warning));

        let mut errors = vec![context(ErrorSeverity::Critical)];
        errors.extend(warnings(9));
        assert!(handler.should_require_manual_review(0.9, &errors));
        errors.push(context(ErrorSeverity::Warning));
        assert!(!handler.should_require_manual_review(0.9, &errors));

        let mut errors = vec![context(ErrorSeverity::Major), context(ErrorSeverity::Major)];
        errors.extend(warnings(3));
        assert!(handler.should_require_manual_review(0.9, &errors));
        errors.extend(warnings(1));
        assert!(!handler.should_require_manual_review(0.9, &errors));
    }
}
