//! JSON output adapter.

use anyhow::Result;
use idphoto_core::{ProcessingResult, ResultOutput};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::debug;

/// One output line: a processing result stamped with the standard and time.
#[derive(Serialize)]
pub struct ResultRecord<'a> {
    /// Photo standard the image was checked against.
    pub standard: &'a str,
    /// RFC 3339 time the record was written.
    pub timestamp: String,
    /// Whether the photo passes, after kept corrections.
    pub passes: bool,
    /// Whether a human should confirm the decision.
    pub requires_manual_review: bool,
    /// Failing rules, after kept corrections.
    pub violations: usize,
    #[serde(flatten)]
    pub result: &'a ProcessingResult,
}

impl<'a> ResultRecord<'a> {
    /// Wraps `result`, stamping the current time.
    #[must_use]
    pub fn new(standard: &'a str, result: &'a ProcessingResult) -> Self {
        Self {
            standard,
            timestamp: iso_timestamp(),
            passes: result.passes(),
            requires_manual_review: result.requires_manual_review(),
            violations: result.violation_count(),
            result,
        }
    }
}

/// JSON Lines output adapter.
pub struct JsonOutput {
    writer: Mutex<Box<dyn Write + Send>>,
    standard: String,
}

impl JsonOutput {
    /// Creates a new JSON output writing to stdout.
    #[must_use]
    pub fn stdout(standard: impl Into<String>) -> Self {
        Self::new(Box::new(io::stdout()), standard)
    }

    /// Creates a new JSON output writing to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>, standard: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            standard: standard.into(),
        }
    }

    /// Writes a batch of results as a JSON array.
    #[allow(clippy::significant_drop_tightening)]
    pub fn write_array(&self, results: &[ProcessingResult], pretty: bool) -> Result<()> {
        let records: Vec<ResultRecord<'_>> = results
            .iter()
            .map(|r| ResultRecord::new(&self.standard, r))
            .collect();
        let json = if pretty {
            serde_json::to_string_pretty(&records)?
        } else {
            serde_json::to_string(&records)?
        };
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writeln!(writer, "{json}")?;
        Ok(())
    }
}

impl ResultOutput for JsonOutput {
    #[allow(clippy::significant_drop_tightening)]
    fn write(&self, result: &ProcessingResult) -> Result<()> {
        let json = serde_json::to_string(&ResultRecord::new(&self.standard, result))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writeln!(writer, "{json}")?;
        Ok(())
    }

    #[allow(clippy::significant_drop_tightening)]
    fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writer.flush()?;
        Ok(())
    }
}

/// Generate ISO 8601 UTC timestamp (RFC 3339 format).
fn iso_timestamp() -> String {
    match time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            debug!("Timestamp format failed: {e}");
            String::from("1970-01-01T00:00:00Z")
        }
    }
}
