//! Engine configuration.
//!
//! Settings shared by every retrieval made through one
//! [`LogTail`](crate::LogTail): the namespace, the byte cap applied when the
//! caller gives none, the default tail length, and an optional per-source
//! deadline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TailError};

/// Byte cap applied to each source stream when the caller specifies none.
pub const DEFAULT_LIMIT_BYTES: i64 = 5_000_000;

/// Number of trailing lines requested when neither a start time nor a
/// positive tail length is given.
pub const DEFAULT_TAIL_LINES: i64 = 200;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Maximum length of a namespace name (DNS label).
const MAX_NAMESPACE_LENGTH: usize = 63;

/// Retrieval engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailConfig {
    /// Namespace every retrieval is scoped to.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Default per-source byte cap.
    #[serde(default = "default_limit_bytes")]
    pub limit_bytes: i64,
    /// Default number of trailing lines per source.
    #[serde(default = "default_tail_lines")]
    pub default_tail_lines: i64,
    /// Deadline for fetching a single source, in seconds.
    #[serde(default)]
    pub source_timeout_secs: Option<u64>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

const fn default_limit_bytes() -> i64 {
    DEFAULT_LIMIT_BYTES
}

const fn default_tail_lines() -> i64 {
    DEFAULT_TAIL_LINES
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            limit_bytes: DEFAULT_LIMIT_BYTES,
            default_tail_lines: DEFAULT_TAIL_LINES,
            source_timeout_secs: None,
        }
    }
}

impl TailConfig {
    /// Creates the default configuration scoped to `namespace`.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Sets the per-source deadline.
    #[must_use]
    pub const fn with_source_timeout(mut self, secs: u64) -> Self {
        self.source_timeout_secs = Some(secs);
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TailError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| TailError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(TailError::Config("namespace cannot be empty".to_string()));
        }

        if self.namespace.len() > MAX_NAMESPACE_LENGTH {
            return Err(TailError::Config(
                "namespace cannot exceed 63 characters".to_string(),
            ));
        }

        let bytes = self.namespace.as_bytes();
        let valid_chars = bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
        let valid_ends = bytes.first().is_some_and(u8::is_ascii_alphanumeric)
            && bytes.last().is_some_and(u8::is_ascii_alphanumeric);
        if !valid_chars || !valid_ends {
            return Err(TailError::Config(format!(
                "namespace '{}' must be a lowercase DNS label",
                self.namespace
            )));
        }

        if self.limit_bytes <= 0 {
            return Err(TailError::Config(
                "limit_bytes must be greater than 0".to_string(),
            ));
        }

        if self.default_tail_lines <= 0 {
            return Err(TailError::Config(
                "default_tail_lines must be greater than 0".to_string(),
            ));
        }

        if self.source_timeout_secs == Some(0) {
            return Err(TailError::Config(
                "source_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the per-source deadline, if any.
    #[must_use]
    pub fn source_timeout(&self) -> Option<Duration> {
        self.source_timeout_secs.map(Duration::from_secs)
    }
}
