//! Progress reporting port for UI integration.

use crate::domain::ProcessingProgress;

/// Port for receiving per-session progress events.
pub trait ProgressSink: Send + Sync {
    /// Called on every stage transition of a session.
    fn on_progress(&self, session_id: &str, progress: &ProcessingProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, &ProcessingProgress) + Send + Sync,
{
    fn on_progress(&self, session_id: &str, progress: &ProcessingProgress) {
        self(session_id, progress);
    }
}
