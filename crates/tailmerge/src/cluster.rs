//! Cluster API seam.
//!
//! The engine never talks to a control plane directly. Instance listing,
//! selector resolution and log streams all go through [`ClusterApi`], so the
//! same retrieval code runs against a live cluster or the in-memory one.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::selector::LabelSelector;

/// Boxed future returned by [`ClusterApi`] methods.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Byte stream of log text from one channel.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// A running instance as returned by [`ClusterApi::list_instances`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Instance name, unique within its namespace.
    pub name: String,
    /// Labels attached to the instance.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl InstanceDescriptor {
    /// Creates a descriptor without labels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Parameters for opening a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamParams {
    /// Channel (container) to read.
    pub channel: String,
    /// Keep the stream open for new output.
    pub follow: bool,
    /// Read the previous terminated run of the channel.
    pub previous: bool,
    /// Prefix every line with its RFC3339 capture time.
    pub timestamps: bool,
    /// Stop after this many bytes.
    pub limit_bytes: Option<i64>,
    /// Only return lines at or after this instant.
    pub since_time: Option<DateTime<Utc>>,
    /// Only return this many trailing lines.
    pub tail_lines: Option<i64>,
}

impl LogStreamParams {
    /// Creates bounded, timestamped parameters for `channel` with no selection.
    pub fn bounded(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            follow: false,
            previous: false,
            timestamps: true,
            limit_bytes: None,
            since_time: None,
            tail_lines: None,
        }
    }
}

/// Control-plane operations the retrieval engine depends on.
///
/// Implementations must be shareable across the fan-out tasks of a workload
/// retrieval, hence `Send + Sync`.
pub trait ClusterApi: Send + Sync {
    /// Lists the log channels of an instance in declared order.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::NotFound`](crate::TailError::NotFound) if the
    /// instance does not exist.
    fn instance_channels<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
    ) -> ClusterFuture<'a, Vec<String>>;

    /// Resolves the label selector of a workload.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::NotFound`](crate::TailError::NotFound) if the
    /// workload does not exist.
    fn workload_selector<'a>(
        &'a self,
        namespace: &'a str,
        workload: &'a str,
    ) -> ClusterFuture<'a, LabelSelector>;

    /// Lists the instances matching a selector query. The empty query
    /// matches every instance in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_instances<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<InstanceDescriptor>>;

    /// Opens a log stream for one channel of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Stream`](crate::TailError::Stream) on transport
    /// failure.
    fn open_log_stream<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
        params: &'a LogStreamParams,
    ) -> ClusterFuture<'a, LogStream>;
}

impl<T: ClusterApi + ?Sized> ClusterApi for std::sync::Arc<T> {
    fn instance_channels<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        (**self).instance_channels(namespace, instance)
    }

    fn workload_selector<'a>(
        &'a self,
        namespace: &'a str,
        workload: &'a str,
    ) -> ClusterFuture<'a, LabelSelector> {
        (**self).workload_selector(namespace, workload)
    }

    fn list_instances<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<InstanceDescriptor>> {
        (**self).list_instances(namespace, selector)
    }

    fn open_log_stream<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
        params: &'a LogStreamParams,
    ) -> ClusterFuture<'a, LogStream> {
        (**self).open_log_stream(namespace, instance, params)
    }
}
