//! Core types for log retrieval.
//!
//! This module provides:
//! - [`LogTimestamp`] - Textual timestamp, ordered as a string
//! - [`LogRecord`] - One normalized line tagged with its source
//! - [`RecordBody`] - Real content or a contained per-source failure
//! - [`RecordSequence`] - Ordered collection of records
//! - [`RetrievalOptions`] - Caller-supplied bounds for a retrieval

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of a log record, kept in its original textual form.
///
/// RFC3339 timestamps with fixed nanosecond precision sort correctly as plain
/// strings, so ordering is lexicographic. Lines without a detectable
/// timestamp carry [`LogTimestamp::SENTINEL`], which sorts before every
/// RFC3339 value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogTimestamp(String);

impl LogTimestamp {
    /// Text used for records with no detectable timestamp.
    pub const SENTINEL: &'static str = "0";

    /// Wraps a raw timestamp token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the sentinel timestamp.
    #[must_use]
    pub fn sentinel() -> Self {
        Self(Self::SENTINEL.to_string())
    }

    /// Returns the current time formatted as RFC3339 with nanoseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Formats a UTC instant the same way the cluster stamps log lines.
    #[must_use]
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Nanos, true))
    }

    /// Returns true for the sentinel value.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0 == Self::SENTINEL
    }

    /// Returns the raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum RecordBody {
    /// A line of real log output.
    Line(String),
    /// A fetch failure for this record's source, reported in-band.
    SourceError(String),
}

impl RecordBody {
    /// Returns the text of the body regardless of variant.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Line(text) | Self::SourceError(text) => text,
        }
    }

    /// Returns true for [`RecordBody::SourceError`].
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::SourceError(_))
    }
}

/// One normalized log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Capture time as reported by the source.
    pub timestamp: LogTimestamp,
    /// Instance the record came from.
    pub source_id: String,
    /// Line content or source error.
    pub body: RecordBody,
}

impl LogRecord {
    /// Creates a record for a line of log output.
    pub fn line(
        timestamp: LogTimestamp,
        source_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            body: RecordBody::Line(content.into()),
        }
    }

    /// Creates a record describing a failed fetch, stamped with the current time.
    pub fn source_error(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: LogTimestamp::now(),
            source_id: source_id.into(),
            body: RecordBody::SourceError(message.into()),
        }
    }

    /// Returns the text of the record.
    #[must_use]
    pub fn content(&self) -> &str {
        self.body.content()
    }

    /// Returns true if this record reports a source failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.body.is_error()
    }
}

/// An ordered collection of [`LogRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSequence {
    records: Vec<LogRecord>,
}

impl RecordSequence {
    /// Creates an empty sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Creates a sequence holding a single record.
    #[must_use]
    pub fn single(record: LogRecord) -> Self {
        Self {
            records: vec![record],
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    /// Appends every record of `other`, preserving its order.
    pub fn append(&mut self, other: Self) {
        self.records.extend(other.records);
    }

    /// Sorts by timestamp ascending. Equal timestamps keep their arrival order.
    pub fn sort_by_time(&mut self) {
        self.records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }

    /// Drops all but the last `n` records.
    pub fn keep_newest(&mut self, n: usize) {
        if self.records.len() > n {
            let excess = self.records.len() - n;
            self.records.drain(..excess);
        }
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of in-band source error records.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_error()).count()
    }

    /// Iterates over the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }

    /// Returns the records as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[LogRecord] {
        &self.records
    }

    /// Consumes the sequence, returning the records.
    #[must_use]
    pub fn into_vec(self) -> Vec<LogRecord> {
        self.records
    }
}

impl From<Vec<LogRecord>> for RecordSequence {
    fn from(records: Vec<LogRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<LogRecord> for RecordSequence {
    fn from_iter<I: IntoIterator<Item = LogRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordSequence {
    type Item = LogRecord;
    type IntoIter = std::vec::IntoIter<LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSequence {
    type Item = &'a LogRecord;
    type IntoIter = std::slice::Iter<'a, LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Bounds for a retrieval call.
///
/// `from_time` and `tail_lines` are alternative selection modes. When
/// `from_time` is set only entries strictly after it are requested and
/// `tail_lines` is ignored. Non-positive numeric fields mean "use the
/// default" (for `tail_lines` and `limit_bytes`) or "unlimited" (for
/// `limit_lines`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalOptions {
    /// Only return entries logged after this instant.
    pub from_time: Option<DateTime<Utc>>,
    /// Number of trailing lines to request per source.
    pub tail_lines: i64,
    /// Byte cap per source stream.
    pub limit_bytes: i64,
    /// Cap on the number of records returned, keeping the newest.
    pub limit_lines: i64,
    /// Channel to read instead of the instance's first declared channel.
    pub channel: Option<String>,
}

impl RetrievalOptions {
    /// Creates options with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests entries strictly after `from`.
    #[must_use]
    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from_time = Some(from);
        self
    }

    /// Requests the last `lines` lines per source.
    #[must_use]
    pub fn tail(mut self, lines: i64) -> Self {
        self.tail_lines = lines;
        self
    }

    /// Caps each source stream at `bytes`.
    #[must_use]
    pub fn with_limit_bytes(mut self, bytes: i64) -> Self {
        self.limit_bytes = bytes;
        self
    }

    /// Caps the returned sequence at the newest `lines` records.
    #[must_use]
    pub fn with_limit_lines(mut self, lines: i64) -> Self {
        self.limit_lines = lines;
        self
    }

    /// Reads the named channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Applies `limit_lines` to a finished sequence.
    pub(crate) fn apply_line_limit(&self, records: &mut RecordSequence) {
        if self.limit_lines > 0 {
            records.keep_newest(self.limit_lines as usize);
        }
    }
}
