//! Per-image processing session.

use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::domain::{ErrorContext, ImageMetrics, ProcessingProgress, ProcessingStage};
use crate::error::PipelineError;

/// Read-only view of an in-flight session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Input path or identifier.
    pub path: String,
    /// Current stage.
    pub stage: ProcessingStage,
    /// Progress percentage.
    pub percent: u8,
    /// Errors recorded so far.
    pub error_count: usize,
}

/// State of one `process_image` call. Owned by the calling worker and
/// dropped when the call returns.
#[derive(Debug)]
pub struct ProcessingSession {
    id: String,
    path: String,
    stage: ProcessingStage,
    started: Instant,
    stage_started: Instant,
    stage_timings: Vec<(ProcessingStage, u64)>,
    errors: Vec<ErrorContext>,
    recovery_attempts: u32,
    confidence: f64,
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl ProcessingSession {
    /// Starts a session in the loading stage.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            path: path.into(),
            stage: ProcessingStage::ImageLoading,
            started: now,
            stage_started: now,
            stage_timings: Vec::new(),
            errors: Vec::new(),
            recovery_attempts: 0,
            confidence: 1.0,
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Input path or identifier.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Errors recorded so far.
    #[must_use]
    pub fn errors(&self) -> &[ErrorContext] {
        &self.errors
    }

    /// Moves to `stage`, closing the timing of the previous one.
    pub fn enter(&mut self, stage: ProcessingStage) -> ProcessingProgress {
        self.stage_timings
            .push((self.stage, elapsed_ms(self.stage_started)));
        self.stage = stage;
        self.stage_started = Instant::now();
        debug!("[{}] {} -> {stage}", self.id, self.path);
        ProcessingProgress::entering(stage)
    }

    /// Updates the confidence stored with subsequent error records.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = confidence;
    }

    /// Records an error raised in the current stage.
    pub fn record_error(&mut self, err: &PipelineError) {
        self.errors
            .push(ErrorContext::new(self.stage, err, self.confidence));
    }

    /// Counts a recovery attempt against the most recent error.
    pub fn note_recovery_attempt(&mut self) {
        self.recovery_attempts += 1;
        if let Some(last) = self.errors.last_mut() {
            last.recovery_attempted = true;
        }
    }

    /// Marks every error of the current stage as recovered.
    pub fn mark_recovered(&mut self) {
        let stage = self.stage;
        for err in self.errors.iter_mut().filter(|e| e.stage == stage) {
            err.recovery_successful = true;
        }
    }

    /// Snapshot for the active-session registry.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            path: self.path.clone(),
            stage: self.stage,
            percent: self.stage.percent(),
            error_count: self.errors.len(),
        }
    }

    /// Ends the session, returning its timings and errors.
    #[must_use]
    pub fn finish(
        mut self,
        terminal: ProcessingStage,
        cache_hit: bool,
    ) -> (ImageMetrics, Vec<ErrorContext>) {
        self.stage_timings
            .push((self.stage, elapsed_ms(self.stage_started)));
        self.stage = terminal;
        let metrics = ImageMetrics {
            processing_ms: elapsed_ms(self.started),
            stage_timings_ms: self.stage_timings,
            recovery_attempts: self.recovery_attempts,
            cache_hit,
        };
        (metrics, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions_record_timings() {
        let mut session = ProcessingSession::new("s-1", "a.jpg");
        let progress = session.enter(ProcessingStage::FaceDetection);
        assert_eq!(progress.percent, 15);
        session.enter(ProcessingStage::FaceAnalysis);
        let (metrics, errors) = session.finish(ProcessingStage::Complete, false);
        let stages: Vec<ProcessingStage> =
            metrics.stage_timings_ms.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            stages,
            vec![
                ProcessingStage::ImageLoading,
                ProcessingStage::FaceDetection,
                ProcessingStage::FaceAnalysis
            ]
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_recovery_bookkeeping() {
        let mut session = ProcessingSession::new("s-2", "b.jpg");
        session.enter(ProcessingStage::FaceDetection);
        session.record_error(&PipelineError::Detection("no face".into()));
        session.note_recovery_attempt();
        session.mark_recovered();
        assert_eq!(session.snapshot().error_count, 1);
        let (metrics, errors) = session.finish(ProcessingStage::Complete, false);
        assert_eq!(metrics.recovery_attempts, 1);
        assert!(errors[0].recovery_attempted && errors[0].recovery_successful);
    }
}
