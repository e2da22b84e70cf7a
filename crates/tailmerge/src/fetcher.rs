//! Single-source log retrieval.
//!
//! A [`SourceFetcher`] reads one channel of one instance through a bounded,
//! timestamped log stream and normalizes the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::cluster::{ClusterApi, LogStream, LogStreamParams};
use crate::config::TailConfig;
use crate::error::{ResourceKind, Result, TailError};
use crate::normalizer::normalize;
use crate::types::{RecordSequence, RetrievalOptions};

/// Fetches and normalizes the logs of a single instance.
pub struct SourceFetcher<C: ?Sized> {
    cluster: Arc<C>,
    namespace: Arc<str>,
    limit_bytes: i64,
    default_tail_lines: i64,
    timeout: Option<Duration>,
}

impl<C: ?Sized> Clone for SourceFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            namespace: Arc::clone(&self.namespace),
            limit_bytes: self.limit_bytes,
            default_tail_lines: self.default_tail_lines,
            timeout: self.timeout,
        }
    }
}

impl<C: ClusterApi + ?Sized> SourceFetcher<C> {
    /// Creates a fetcher bound to the configured namespace.
    #[must_use]
    pub fn new(cluster: Arc<C>, config: &TailConfig) -> Self {
        Self {
            cluster,
            namespace: Arc::from(config.namespace.as_str()),
            limit_bytes: config.limit_bytes,
            default_tail_lines: config.default_tail_lines,
            timeout: config.source_timeout(),
        }
    }

    /// Returns the namespace this fetcher reads from.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the cluster client.
    #[must_use]
    pub fn cluster(&self) -> &Arc<C> {
        &self.cluster
    }

    /// Fetches the logs of `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::NotFound`] for an unknown instance or channel,
    /// [`TailError::NoChannel`] if the instance has no channels,
    /// [`TailError::Stream`] if the stream cannot be opened or read, and
    /// [`TailError::Timeout`] if the configured deadline expires.
    pub async fn fetch(&self, instance: &str, options: &RetrievalOptions) -> Result<RecordSequence> {
        match self.timeout {
            Some(after) => tokio::time::timeout(after, self.fetch_unbounded(instance, options))
                .await
                .map_err(|_| TailError::Timeout {
                    instance: instance.to_string(),
                    after,
                })?,
            None => self.fetch_unbounded(instance, options).await,
        }
    }

    async fn fetch_unbounded(
        &self,
        instance: &str,
        options: &RetrievalOptions,
    ) -> Result<RecordSequence> {
        let channels = self
            .cluster
            .instance_channels(&self.namespace, instance)
            .await?;
        let channel = select_channel(instance, &channels, options.channel.as_deref())?;
        let params = self.stream_params(channel, options);

        debug!(
            namespace = %self.namespace,
            instance,
            channel,
            since = ?params.since_time,
            tail = ?params.tail_lines,
            limit_bytes = ?params.limit_bytes,
            "opening log stream"
        );

        let stream = self
            .cluster
            .open_log_stream(&self.namespace, instance, &params)
            .await?;
        let lines = read_lines(instance, stream).await?;
        let records = normalize(instance, &lines, params.timestamps);

        debug!(instance, lines = lines.len(), records = records.len(), "log stream drained");
        Ok(records)
    }

    /// Builds the stream parameters for one fetch.
    ///
    /// A start time selects everything strictly after it, so the request
    /// starts one nanosecond later, saturating at the latest representable
    /// time. Without a start time the last
    /// `tail_lines` lines are requested, falling back to the configured
    /// default when the caller gives a non-positive count.
    #[must_use]
    pub fn stream_params(&self, channel: &str, options: &RetrievalOptions) -> LogStreamParams {
        let mut params = LogStreamParams::bounded(channel);

        params.limit_bytes = Some(if options.limit_bytes > 0 {
            options.limit_bytes
        } else {
            self.limit_bytes
        });

        match options.from_time {
            Some(from) => {
                params.since_time = Some(
                    from.checked_add_signed(TimeDelta::nanoseconds(1))
                        .unwrap_or(from),
                );
            }
            None => {
                params.tail_lines = Some(if options.tail_lines > 0 {
                    options.tail_lines
                } else {
                    self.default_tail_lines
                });
            }
        }

        params
    }
}

/// Picks the requested channel, or the first declared one.
fn select_channel<'a>(
    instance: &str,
    channels: &'a [String],
    requested: Option<&str>,
) -> Result<&'a str> {
    if channels.is_empty() {
        return Err(TailError::NoChannel {
            instance: instance.to_string(),
        });
    }

    match requested {
        Some(name) => channels
            .iter()
            .find(|c| c.as_str() == name)
            .map(String::as_str)
            .ok_or_else(|| TailError::not_found(ResourceKind::Channel, format!("{instance}/{name}"))),
        None => Ok(channels[0].as_str()),
    }
}

/// Reads a stream to the end, splitting on `\n`. A final unterminated line is
/// kept. Invalid UTF-8 is replaced rather than rejected.
async fn read_lines(instance: &str, stream: LogStream) -> Result<Vec<String>> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| TailError::stream(instance, e))?;
        if read == 0 {
            break;
        }
        lines.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCluster, MemoryInstance};
    use chrono::{TimeZone, Utc};

    fn cluster() -> Arc<InMemoryCluster> {
        let cluster = InMemoryCluster::new();
        cluster.add_instance(
            "default",
            MemoryInstance::new("api-0")
                .with_channel("app")
                .with_channel("sidecar")
                .with_lines(
                    "app",
                    [
                        "2019-04-08T12:25:45.000000001Z starting",
                        "2019-04-08T12:25:46.000000001Z ready",
                    ],
                )
                .with_lines("sidecar", ["2019-04-08T12:25:45.500000000Z proxy up"]),
        );
        cluster.add_instance("default", MemoryInstance::new("empty-0"));
        Arc::new(cluster)
    }

    fn fetcher(cluster: &Arc<InMemoryCluster>) -> SourceFetcher<InMemoryCluster> {
        SourceFetcher::new(Arc::clone(cluster), &TailConfig::default())
    }

    #[test]
    fn params_default_to_tail_and_byte_cap() {
        let cluster = cluster();
        let params = fetcher(&cluster).stream_params("app", &RetrievalOptions::new());

        assert_eq!(params.tail_lines, Some(200));
        assert_eq!(params.limit_bytes, Some(5_000_000));
        assert!(params.since_time.is_none());
        assert!(params.timestamps);
        assert!(!params.follow);
        assert!(!params.previous);
    }

    #[test]
    fn params_non_positive_tail_uses_default() {
        let cluster = cluster();
        let params = fetcher(&cluster).stream_params("app", &RetrievalOptions::new().tail(-5));
        assert_eq!(params.tail_lines, Some(200));

        let params = fetcher(&cluster).stream_params("app", &RetrievalOptions::new().tail(25));
        assert_eq!(params.tail_lines, Some(25));
    }

    #[test]
    fn params_since_is_one_nanosecond_after_from_time() {
        let cluster = cluster();
        let from = Utc
            .with_ymd_and_hms(2019, 4, 8, 12, 25, 45)
            .single()
            .unwrap_or_default();
        let params = fetcher(&cluster).stream_params(
            "app",
            &RetrievalOptions::new().since(from).tail(10),
        );

        assert_eq!(params.since_time, Some(from + TimeDelta::nanoseconds(1)));
        assert!(params.tail_lines.is_none());
    }

    #[test]
    fn params_since_saturates_at_latest_time() {
        let cluster = cluster();
        let latest = chrono::DateTime::<Utc>::MAX_UTC;
        let params = fetcher(&cluster)
            .stream_params("app", &RetrievalOptions::new().since(latest));

        assert_eq!(params.since_time, Some(latest));
        assert!(params.tail_lines.is_none());
    }

    #[test]
    fn params_caller_byte_cap_wins() {
        let cluster = cluster();
        let params = fetcher(&cluster).stream_params(
            "app",
            &RetrievalOptions::new().with_limit_bytes(4096),
        );
        assert_eq!(params.limit_bytes, Some(4096));
    }

    #[tokio::test]
    async fn fetch_reads_first_channel() {
        let cluster = cluster();
        let records = fetcher(&cluster)
            .fetch("api-0", &RetrievalOptions::new())
            .await
            .expect("fetch should succeed");

        let contents: Vec<_> = records.iter().map(|r| r.content()).collect();
        assert_eq!(contents, vec!["starting", "ready"]);
        assert!(records.iter().all(|r| r.source_id == "api-0"));
    }

    #[tokio::test]
    async fn fetch_honours_channel_override() {
        let cluster = cluster();
        let records = fetcher(&cluster)
            .fetch("api-0", &RetrievalOptions::new().with_channel("sidecar"))
            .await
            .expect("fetch should succeed");

        assert_eq!(records.len(), 1);
        assert_eq!(records.as_slice()[0].content(), "proxy up");
    }

    #[tokio::test]
    async fn fetch_unknown_channel_is_not_found() {
        let cluster = cluster();
        let result = fetcher(&cluster)
            .fetch("api-0", &RetrievalOptions::new().with_channel("missing"))
            .await;

        assert!(matches!(
            result,
            Err(TailError::NotFound {
                kind: ResourceKind::Channel,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn fetch_without_channels_fails() {
        let cluster = cluster();
        let result = fetcher(&cluster)
            .fetch("empty-0", &RetrievalOptions::new())
            .await;
        assert!(matches!(result, Err(TailError::NoChannel { .. })));
    }

    #[tokio::test]
    async fn fetch_unknown_instance_is_not_found() {
        let cluster = cluster();
        let result = fetcher(&cluster)
            .fetch("ghost-0", &RetrievalOptions::new())
            .await;
        assert!(matches!(
            result,
            Err(TailError::NotFound {
                kind: ResourceKind::Instance,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn read_lines_keeps_unterminated_tail() {
        let stream: LogStream = Box::pin(std::io::Cursor::new(b"one\ntwo\nthree".to_vec()));
        let lines = read_lines("x", stream).await.expect("read should succeed");
        assert_eq!(lines, vec!["one\n", "two\n", "three"]);
    }

    #[tokio::test]
    async fn read_lines_replaces_invalid_utf8() {
        let stream: LogStream = Box::pin(std::io::Cursor::new(vec![b'o', 0xff, b'k', b'\n']));
        let lines = read_lines("x", stream).await.expect("read should succeed");
        assert_eq!(lines, vec!["o\u{fffd}k\n"]);
    }
}
