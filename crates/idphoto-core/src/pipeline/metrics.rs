//! Aggregate processing metrics and the periodic reporter.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::ProcessingController;
use crate::domain::ProcessingResult;
use crate::error::ErrorKind;

/// Point-in-time view of controller activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingMetrics {
    /// Images processed since the controller was built.
    pub total_processed: u64,
    /// Images that completed successfully.
    pub successful: u64,
    /// Images that failed.
    pub failed: u64,
    /// Mean wall-clock time per image.
    pub average_processing_ms: f64,
    /// Recorded errors by kind.
    pub errors_by_kind: BTreeMap<ErrorKind, u64>,
    /// Images flagged for manual review.
    pub manual_review_count: u64,
    /// Sessions currently in flight.
    pub active_sessions: usize,
    /// Validations served from the cache.
    pub cache_hits: u64,
    /// RFC 3339 capture time.
    pub captured_at: String,
}

#[derive(Debug, Default)]
struct Totals {
    processed: u64,
    successful: u64,
    failed: u64,
    total_ms: u64,
    errors_by_kind: BTreeMap<ErrorKind, u64>,
    manual_review: u64,
    cache_hits: u64,
}

/// Thread-safe accumulator fed by every finished session.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    totals: Mutex<Totals>,
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one finished result.
    pub fn record(&self, result: &ProcessingResult) {
        let mut totals = self.lock();
        totals.processed += 1;
        if result.success {
            totals.successful += 1;
        } else {
            totals.failed += 1;
        }
        totals.total_ms += result.processing_metrics.processing_ms;
        for err in &result.errors {
            *totals.errors_by_kind.entry(err.kind).or_insert(0) += 1;
        }
        if result.requires_manual_review() {
            totals.manual_review += 1;
        }
        if result.processing_metrics.cache_hit {
            totals.cache_hits += 1;
        }
    }

    /// Snapshot of the totals with the given number of active sessions.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn snapshot(&self, active_sessions: usize) -> ProcessingMetrics {
        let totals = self.lock();
        let average_processing_ms = if totals.processed == 0 {
            0.0
        } else {
            totals.total_ms as f64 / totals.processed as f64
        };
        ProcessingMetrics {
            total_processed: totals.processed,
            successful: totals.successful,
            failed: totals.failed,
            average_processing_ms,
            errors_by_kind: totals.errors_by_kind.clone(),
            manual_review_count: totals.manual_review,
            active_sessions,
            cache_hits: totals.cache_hits,
            captured_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Totals> {
        self.totals
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Background thread that publishes a metrics snapshot at a fixed
/// interval until stopped or dropped.
#[derive(Debug)]
pub struct MetricsReporter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MetricsReporter {
    /// Starts reporting `controller` metrics every `interval`.
    ///
    /// Snapshots are sent on the returned receiver and logged at info
    /// level. Reporting ends when the receiver is dropped or
    /// [`MetricsReporter::stop`] is called.
    #[must_use]
    pub fn start(
        controller: ProcessingController,
        interval: Duration,
    ) -> (Self, Receiver<ProcessingMetrics>) {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            let metrics = controller.get_processing_metrics();
            info!(
                "processed {} ({} ok, {} failed), {} active, avg {:.0} ms",
                metrics.total_processed,
                metrics.successful,
                metrics.failed,
                metrics.active_sessions,
                metrics.average_processing_ms
            );
            if tx.send(metrics).is_err() {
                debug!("metrics receiver dropped; stopping reporter");
                break;
            }
        });
        (
            Self {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            rx,
        )
    }

    /// Stops the reporter and waits for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorContext, ImageMetrics, ProcessingStage};
    use crate::error::PipelineError;

    fn result(success: bool, ms: u64, errors: Vec<ErrorContext>) -> ProcessingResult {
        ProcessingResult {
            session_id: "s".into(),
            path: "p".into(),
            success,
            validation_result: None,
            auto_fix_result: None,
            processing_metrics: ImageMetrics {
                processing_ms: ms,
                ..ImageMetrics::default()
            },
            error_message: None,
            errors,
        }
    }

    #[test]
    fn test_collector_totals() {
        let collector = MetricsCollector::new();
        collector.record(&result(true, 10, vec![]));
        let detection = ErrorContext::new(
            ProcessingStage::FaceDetection,
            &PipelineError::Detection("none".into()),
            0.4,
        );
        collector.record(&result(false, 30, vec![detection]));

        let metrics = collector.snapshot(3);
        assert_eq!(metrics.total_processed, 2);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failed, 1);
        assert!((metrics.average_processing_ms - 20.0).abs() < 1e-9);
        assert_eq!(metrics.errors_by_kind.get(&ErrorKind::Detection), Some(&1));
        // failed images always need review
        assert_eq!(metrics.manual_review_count, 1);
        assert_eq!(metrics.active_sessions, 3);
        assert!(!metrics.captured_at.is_empty());
    }

    #[test]
    fn test_empty_collector_average_is_zero() {
        let metrics = MetricsCollector::new().snapshot(0);
        assert_eq!(metrics.total_processed, 0);
        assert!(metrics.average_processing_ms.abs() < f64::EPSILON);
    }
}
