//! Error types for log retrieval.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Kind of cluster object a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A single running instance (pod).
    Instance,
    /// A logical workload (deployment).
    Workload,
    /// A namespace.
    Namespace,
    /// A log channel (container) inside an instance.
    Channel,
}

impl ResourceKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Workload => "workload",
            Self::Namespace => "namespace",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while retrieving logs.
#[derive(Debug, Error)]
pub enum TailError {
    /// The named instance, workload, namespace or channel does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up.
        kind: ResourceKind,
        /// Name that was looked up.
        name: String,
    },

    /// A workload selector could not be turned into a query.
    #[error("selector cannot be selected: {0}")]
    Selection(String),

    /// Opening or reading a log stream failed.
    #[error("log stream for {instance} failed: {message}")]
    Stream {
        /// Instance whose stream failed.
        instance: String,
        /// Transport error description.
        message: String,
    },

    /// The instance declares no log channels.
    #[error("instance {instance} has no log channels")]
    NoChannel {
        /// Instance without channels.
        instance: String,
    },

    /// Fetching one source took longer than the configured deadline.
    #[error("log stream for {instance} timed out after {after:?}")]
    Timeout {
        /// Instance that timed out.
        instance: String,
        /// Deadline that expired.
        after: Duration,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    /// Shorthand for a [`TailError::NotFound`].
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a [`TailError::Stream`].
    pub fn stream(instance: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Stream {
            instance: instance.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, TailError>;
