//! In-memory [`ClusterApi`] implementation.
//!
//! [`InMemoryCluster`] holds instances, their channels and stored log lines,
//! and workloads with their selectors. It applies stream parameters the way a
//! real control plane does (since-time, tail, byte cap, timestamp prefix) and
//! records every stream request so callers can inspect what was asked for.
//! Failures and latency can be injected per instance.
//!
//! A cluster can be loaded from JSON:
//!
//! ```json
//! {
//!   "namespaces": {
//!     "default": {
//!       "instances": [
//!         { "name": "api-0", "labels": { "app": "api" },
//!           "channels": [ { "name": "app", "lines": ["2019-04-08T12:25:45.000000000Z hello"] } ] }
//!       ],
//!       "workloads": [
//!         { "name": "api", "selector": { "requirements": [
//!           { "key": "app", "operator": "equals", "values": ["api"] } ] } }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, ReadBuf};

use crate::cluster::{ClusterApi, ClusterFuture, InstanceDescriptor, LogStream, LogStreamParams};
use crate::error::{ResourceKind, Result, TailError};
use crate::selector::LabelSelector;

/// A log channel with its stored lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryChannel {
    /// Channel name.
    pub name: String,
    /// Stored lines, each prefixed with its RFC3339 capture time.
    #[serde(default)]
    pub lines: Vec<String>,
}

/// An instance held by [`InMemoryCluster`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInstance {
    /// Instance name.
    pub name: String,
    /// Instance labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Channels in declared order.
    #[serde(default)]
    pub channels: Vec<MemoryChannel>,
    /// If set, opening a stream fails with this message.
    #[serde(default)]
    pub stream_error: Option<String>,
    /// If set, reading fails with this message after all data is delivered.
    #[serde(default)]
    pub read_error: Option<String>,
    /// Latency added before a stream is returned, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl MemoryInstance {
    /// Creates an instance with no labels or channels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Declares an empty channel.
    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>) -> Self {
        self.channels.push(MemoryChannel {
            name: name.into(),
            lines: Vec::new(),
        });
        self
    }

    /// Appends lines to a channel, declaring it if needed.
    #[must_use]
    pub fn with_lines<I, S>(mut self, channel: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into);
        match self.channels.iter_mut().find(|c| c.name == channel) {
            Some(existing) => existing.lines.extend(lines),
            None => self.channels.push(MemoryChannel {
                name: channel.to_string(),
                lines: lines.collect(),
            }),
        }
        self
    }

    /// Makes stream opening fail.
    #[must_use]
    pub fn with_stream_error(mut self, message: impl Into<String>) -> Self {
        self.stream_error = Some(message.into());
        self
    }

    /// Makes reading fail after the data has been delivered.
    #[must_use]
    pub fn with_read_error(mut self, message: impl Into<String>) -> Self {
        self.read_error = Some(message.into());
        self
    }

    /// Delays stream opening.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    fn descriptor(&self) -> InstanceDescriptor {
        InstanceDescriptor {
            name: self.name.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// A workload held by [`InMemoryCluster`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWorkload {
    /// Workload name.
    pub name: String,
    /// Selector resolving the workload's instances.
    #[serde(default)]
    pub selector: LabelSelector,
}

impl MemoryWorkload {
    /// Creates a workload selecting instances whose labels include `labels`.
    pub fn with_match_labels<I, K, V>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels: BTreeMap<String, String> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            name: name.into(),
            selector: LabelSelector::from_match_labels(&labels),
        }
    }

    /// Creates a workload with an explicit selector.
    pub fn with_selector(name: impl Into<String>, selector: LabelSelector) -> Self {
        Self {
            name: name.into(),
            selector,
        }
    }
}

/// Contents of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNamespace {
    /// Instances in listing order.
    #[serde(default)]
    pub instances: Vec<MemoryInstance>,
    /// Workloads.
    #[serde(default)]
    pub workloads: Vec<MemoryWorkload>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    namespaces: BTreeMap<String, MemoryNamespace>,
}

/// A stream request observed by [`InMemoryCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Namespace of the request.
    pub namespace: String,
    /// Instance whose stream was opened.
    pub instance: String,
    /// Parameters passed by the caller.
    pub params: LogStreamParams,
}

/// Deterministic cluster kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    namespaces: RwLock<BTreeMap<String, MemoryNamespace>>,
    requests: Mutex<Vec<StreamRequest>>,
    list_calls: Mutex<usize>,
}

impl InMemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a cluster from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| TailError::Config(format!("invalid cluster fixture: {e}")))?;
        Ok(Self {
            namespaces: RwLock::new(snapshot.namespaces),
            ..Self::default()
        })
    }

    /// Loads a cluster from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Adds an instance to a namespace, creating the namespace if needed.
    pub fn add_instance(&self, namespace: &str, instance: MemoryInstance) {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .instances
            .push(instance);
    }

    /// Adds a workload to a namespace, creating the namespace if needed.
    pub fn add_workload(&self, namespace: &str, workload: MemoryWorkload) {
        self.namespaces
            .write()
            .entry(namespace.to_string())
            .or_default()
            .workloads
            .push(workload);
    }

    /// Returns every stream request made so far, in order.
    #[must_use]
    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many times instances were listed.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock()
    }

    fn find_instance(&self, namespace: &str, instance: &str) -> Result<MemoryInstance> {
        self.namespaces
            .read()
            .get(namespace)
            .and_then(|ns| ns.instances.iter().find(|i| i.name == instance))
            .cloned()
            .ok_or_else(|| TailError::not_found(ResourceKind::Instance, instance))
    }

    async fn open(
        &self,
        namespace: &str,
        instance: &str,
        params: &LogStreamParams,
    ) -> Result<LogStream> {
        self.requests.lock().push(StreamRequest {
            namespace: namespace.to_string(),
            instance: instance.to_string(),
            params: params.clone(),
        });

        let found = self.find_instance(namespace, instance)?;

        if let Some(ms) = found.delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if let Some(message) = found.stream_error {
            return Err(TailError::stream(instance, message));
        }

        let channel = found
            .channels
            .iter()
            .find(|c| c.name == params.channel)
            .ok_or_else(|| {
                TailError::stream(
                    instance,
                    format!("channel {} is not valid for instance {instance}", params.channel),
                )
            })?;

        let data = render(&channel.lines, params);
        Ok(Box::pin(ScriptedStream {
            data: io::Cursor::new(data),
            error: found.read_error,
        }))
    }
}

impl ClusterApi for InMemoryCluster {
    fn instance_channels<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        Box::pin(async move {
            let found = self.find_instance(namespace, instance)?;
            Ok(found.channels.into_iter().map(|c| c.name).collect())
        })
    }

    fn workload_selector<'a>(
        &'a self,
        namespace: &'a str,
        workload: &'a str,
    ) -> ClusterFuture<'a, LabelSelector> {
        Box::pin(async move {
            self.namespaces
                .read()
                .get(namespace)
                .and_then(|ns| ns.workloads.iter().find(|w| w.name == workload))
                .map(|w| w.selector.clone())
                .ok_or_else(|| TailError::not_found(ResourceKind::Workload, workload))
        })
    }

    fn list_instances<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<InstanceDescriptor>> {
        Box::pin(async move {
            *self.list_calls.lock() += 1;
            let selector = LabelSelector::parse(selector)?;
            Ok(self
                .namespaces
                .read()
                .get(namespace)
                .map(|ns| {
                    ns.instances
                        .iter()
                        .filter(|i| selector.matches(&i.labels))
                        .map(MemoryInstance::descriptor)
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn open_log_stream<'a>(
        &'a self,
        namespace: &'a str,
        instance: &'a str,
        params: &'a LogStreamParams,
    ) -> ClusterFuture<'a, LogStream> {
        Box::pin(self.open(namespace, instance, params))
    }
}

/// Applies since-time, tail, timestamp and byte-cap parameters to stored lines.
fn render(lines: &[String], params: &LogStreamParams) -> Vec<u8> {
    let selected: Vec<&String> = match params.since_time {
        Some(since) => lines
            .iter()
            .filter(|line| line_time(line).is_some_and(|at| at >= since))
            .collect(),
        None => lines.iter().collect(),
    };

    let skip = match params.tail_lines {
        Some(n) if n >= 0 => selected.len().saturating_sub(n as usize),
        _ => 0,
    };

    let mut data = Vec::new();
    for line in &selected[skip..] {
        let text = if params.timestamps {
            line.as_str()
        } else {
            strip_timestamp(line)
        };
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');
    }

    if let Some(limit) = params.limit_bytes {
        if limit >= 0 {
            data.truncate(limit as usize);
        }
    }
    data
}

fn line_time(line: &str) -> Option<DateTime<Utc>> {
    let (token, _) = line.split_once(' ')?;
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn strip_timestamp(line: &str) -> &str {
    match line.split_once(' ') {
        Some((token, rest)) if DateTime::parse_from_rfc3339(token).is_ok() => rest,
        _ => line,
    }
}

/// Delivers buffered data, then optionally fails.
struct ScriptedStream {
    data: io::Cursor<Vec<u8>>,
    error: Option<String>,
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.data.get_ref().len() as u64 - self.data.position();
        if remaining > 0 {
            return Pin::new(&mut self.data).poll_read(cx, buf);
        }
        match self.error.take() {
            Some(message) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            ))),
            None => Poll::Ready(Ok(())),
        }
    }
}
