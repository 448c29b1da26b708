//! Result output port for writing processing results.

use crate::domain::ProcessingResult;

/// Port for outputting processing results.
pub trait ResultOutput: Send + Sync {
    /// Writes a single processing result.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write(&self, result: &ProcessingResult) -> anyhow::Result<()>;

    /// Flushes any buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn flush(&self) -> anyhow::Result<()>;
}
