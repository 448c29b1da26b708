//! Processing pipeline.
//!
//! The [`ProcessingController`] drives each image through the stage
//! machine in its own [`ProcessingSession`], applies the
//! [`ErrorHandler`]'s recovery strategies, and fans batches out over a
//! bounded worker pool.

mod cache;
mod controller;
mod metrics;
mod recovery;
mod session;

pub use cache::{fingerprint, Fingerprint, ResultCache};
pub use controller::{
    BatchResult, ControllerBuilder, ControllerConfig, ProcessingController, ProcessingOptions,
};
pub use metrics::{MetricsCollector, MetricsReporter, ProcessingMetrics};
pub use recovery::{ErrorHandler, RecoveryAction, RecoveryStrategy};
pub use session::{ProcessingSession, SessionSnapshot};
