//! Public retrieval surface.
//!
//! [`LogTail`] binds a cluster client to one namespace and exposes the two
//! retrieval operations. [`TailLogs`] abstracts over them so a caller can
//! hold either scope behind one capability.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use crate::cluster::ClusterApi;
use crate::collector::WorkloadCollector;
use crate::config::TailConfig;
use crate::error::Result;
use crate::fetcher::SourceFetcher;
use crate::types::{RecordSequence, RetrievalOptions};

/// Boxed future returned by [`TailLogs::tail`].
pub type TailFuture<'a> = Pin<Box<dyn Future<Output = Result<RecordSequence>> + Send + 'a>>;

/// What an identifier passed to [`TailLogs::tail`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailScope {
    /// A single instance.
    Instance,
    /// Every instance of a workload.
    Workload,
}

impl fmt::Display for TailScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance => write!(f, "instance"),
            Self::Workload => write!(f, "workload"),
        }
    }
}

/// Log retrieval for one kind of target.
pub trait TailLogs: Send + Sync {
    /// Retrieves the logs of `id`.
    fn tail<'a>(&'a self, id: &'a str, options: &'a RetrievalOptions) -> TailFuture<'a>;

    /// Returns the kind of target this retriever reads.
    fn scope(&self) -> TailScope;
}

/// Log retrieval engine bound to one namespace and one cluster client.
pub struct LogTail<C: ?Sized> {
    fetcher: SourceFetcher<C>,
    config: TailConfig,
}

impl<C: ?Sized> Clone for LogTail<C> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: ClusterApi + ?Sized + 'static> LogTail<C> {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Config`](crate::TailError::Config) if `config`
    /// is invalid.
    pub fn new(cluster: Arc<C>, config: TailConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = SourceFetcher::new(cluster, &config);
        Ok(Self { fetcher, config })
    }

    /// Returns the namespace every retrieval is scoped to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &TailConfig {
        &self.config
    }

    /// Retrieves the logs of a single instance. Errors are returned as-is.
    pub async fn instance_logs(
        &self,
        instance: &str,
        options: &RetrievalOptions,
    ) -> Result<RecordSequence> {
        info!(namespace = self.namespace(), instance, "retrieving instance logs");
        let mut records = self.fetcher.fetch(instance, options).await?;
        options.apply_line_limit(&mut records);
        Ok(records)
    }

    /// Retrieves and merges the logs of every instance of a workload.
    /// Failures of individual instances appear as error records.
    pub async fn workload_logs(
        &self,
        workload: &str,
        options: &RetrievalOptions,
    ) -> Result<RecordSequence> {
        info!(namespace = self.namespace(), workload, "retrieving workload logs");
        WorkloadCollector::new(self.fetcher.clone())
            .collect(workload, options)
            .await
    }

    /// Returns a [`TailLogs`] reading single instances.
    #[must_use]
    pub fn instances(&self) -> InstanceTail<C> {
        InstanceTail {
            inner: self.clone(),
        }
    }

    /// Returns a [`TailLogs`] reading whole workloads.
    #[must_use]
    pub fn workloads(&self) -> WorkloadTail<C> {
        WorkloadTail {
            inner: self.clone(),
        }
    }

    /// Returns the retriever for `scope`.
    #[must_use]
    pub fn scoped(&self, scope: TailScope) -> Box<dyn TailLogs> {
        match scope {
            TailScope::Instance => Box::new(self.instances()),
            TailScope::Workload => Box::new(self.workloads()),
        }
    }
}

/// Single-instance retrieval as a [`TailLogs`].
pub struct InstanceTail<C: ?Sized> {
    inner: LogTail<C>,
}

impl<C: ClusterApi + ?Sized + 'static> TailLogs for InstanceTail<C> {
    fn tail<'a>(&'a self, id: &'a str, options: &'a RetrievalOptions) -> TailFuture<'a> {
        Box::pin(self.inner.instance_logs(id, options))
    }

    fn scope(&self) -> TailScope {
        TailScope::Instance
    }
}

/// Workload retrieval as a [`TailLogs`].
pub struct WorkloadTail<C: ?Sized> {
    inner: LogTail<C>,
}

impl<C: ClusterApi + ?Sized + 'static> TailLogs for WorkloadTail<C> {
    fn tail<'a>(&'a self, id: &'a str, options: &'a RetrievalOptions) -> TailFuture<'a> {
        Box::pin(self.inner.workload_logs(id, options))
    }

    fn scope(&self) -> TailScope {
        TailScope::Workload
    }
}
