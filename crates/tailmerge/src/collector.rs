//! Workload-level log collection.
//!
//! A [`WorkloadCollector`] resolves a workload to its instances, fetches every
//! instance concurrently and merges the results into one time-ordered
//! sequence. Per-source failures never abort the collection: each one becomes
//! a single in-band error record for that source.

use std::fmt;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::fetcher::SourceFetcher;
use crate::types::{LogRecord, RecordSequence, RetrievalOptions};

/// Message recorded for a source whose fetch task did not complete.
const TASK_FAILED_MESSAGE: &str = "log fetch task panicked";

/// Progress of a single collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPhase {
    /// Resolving the workload selector and listing instances.
    Resolving,
    /// Per-instance fetches are running.
    FanOutRunning,
    /// Combining per-instance results.
    Merging,
    /// Collection finished.
    Done,
}

impl fmt::Display for CollectPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::FanOutRunning => "fan_out_running",
            Self::Merging => "merging",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Collects and merges the logs of every instance of a workload.
pub struct WorkloadCollector<C: ?Sized> {
    fetcher: SourceFetcher<C>,
}

impl<C: ClusterApi + ?Sized + 'static> WorkloadCollector<C> {
    /// Creates a collector that fetches through `fetcher`.
    #[must_use]
    pub const fn new(fetcher: SourceFetcher<C>) -> Self {
        Self { fetcher }
    }

    /// Collects the logs of `workload`.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::NotFound`](crate::TailError::NotFound) if the
    /// workload does not exist, [`TailError::Selection`](crate::TailError::Selection)
    /// if its selector cannot be rendered, or the listing error. No instance
    /// is fetched in those cases. Failures of individual instances are
    /// returned in-band.
    pub async fn collect(&self, workload: &str, options: &RetrievalOptions) -> Result<RecordSequence> {
        let namespace = self.fetcher.namespace();
        let cluster = self.fetcher.cluster();

        debug!(namespace, workload, phase = %CollectPhase::Resolving, "collecting workload logs");
        let selector = cluster.workload_selector(namespace, workload).await?;
        let query = selector.to_query()?;
        let instances = cluster.list_instances(namespace, &query).await?;

        debug!(
            workload,
            selector = %query,
            instances = instances.len(),
            phase = %CollectPhase::FanOutRunning,
            "fetching instances"
        );

        let mut tasks = JoinSet::new();
        for (index, instance) in instances.iter().enumerate() {
            let fetcher = self.fetcher.clone();
            let name = instance.name.clone();
            let options = options.clone();
            tasks.spawn(async move {
                let records = match fetcher.fetch(&name, &options).await {
                    Ok(records) => records,
                    Err(err) => {
                        warn!(instance = %name, error = %err, "log fetch failed");
                        RecordSequence::single(LogRecord::source_error(&name, err.to_string()))
                    }
                };
                (index, records)
            });
        }

        let mut slots: Vec<Option<RecordSequence>> = vec![None; instances.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, records)) => slots[index] = Some(records),
                Err(err) => warn!(workload, error = %err, "log fetch task failed"),
            }
        }

        debug!(workload, phase = %CollectPhase::Merging, "merging instance logs");
        let per_source = slots.into_iter().zip(&instances).map(|(slot, instance)| {
            slot.unwrap_or_else(|| {
                RecordSequence::single(LogRecord::source_error(&instance.name, TASK_FAILED_MESSAGE))
            })
        });
        let mut merged = merge(per_source);
        options.apply_line_limit(&mut merged);

        debug!(
            workload,
            records = merged.len(),
            errors = merged.error_count(),
            phase = %CollectPhase::Done,
            "workload logs collected"
        );
        Ok(merged)
    }
}

/// Concatenates per-source sequences in the given order and sorts the result
/// by timestamp. Records with equal timestamps keep their concatenated order.
pub fn merge<I>(sources: I) -> RecordSequence
where
    I: IntoIterator<Item = RecordSequence>,
{
    let mut merged = RecordSequence::new();
    for source in sources {
        merged.append(source);
    }
    merged.sort_by_time();
    merged
}
