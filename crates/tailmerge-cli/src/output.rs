//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;
use tailmerge::RecordSequence;

use crate::cli::Format;
use crate::error::CliError;

/// Width of the timestamp column; fits an RFC3339 nanosecond timestamp.
const TIMESTAMP_WIDTH: usize = 30;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Retrieved records, one row per record.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RecordTable {
    /// Records in display order.
    pub records: RecordSequence,
}

impl RecordTable {
    /// Wraps a record sequence for display.
    #[must_use]
    pub const fn new(records: RecordSequence) -> Self {
        Self { records }
    }

    fn source_width(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.source_id.len())
            .max()
            .unwrap_or(0)
            .max("SOURCE".len())
    }
}

impl TableDisplay for RecordTable {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.records.is_empty() {
            writeln!(writer, "No log records")?;
            return Ok(());
        }

        let source_width = self.source_width();
        writeln!(
            writer,
            "{:<ts$}  {:<src$}  CONTENT",
            "TIMESTAMP",
            "SOURCE",
            ts = TIMESTAMP_WIDTH,
            src = source_width
        )?;

        for record in &self.records {
            let marker = if record.is_error() { "! " } else { "" };
            writeln!(
                writer,
                "{:<ts$}  {:<src$}  {marker}{}",
                record.timestamp.as_str(),
                record.source_id,
                record.content(),
                ts = TIMESTAMP_WIDTH,
                src = source_width
            )?;
        }

        let errors = self.records.error_count();
        if errors > 0 {
            writeln!(writer)?;
            writeln!(writer, "{errors} source(s) failed")?;
        }
        Ok(())
    }
}
