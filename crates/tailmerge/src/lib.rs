//! # tailmerge
//!
//! Bounded log retrieval for cluster workloads.
//!
//! This crate provides:
//!
//! - [`LogTail`] - Retrieval engine bound to one namespace and cluster client
//! - [`TailLogs`] - Single-instance and workload retrieval behind one trait
//! - [`SourceFetcher`] - Reads and normalizes one instance's log channel
//! - [`WorkloadCollector`] - Concurrent fan-out and timestamp merge
//! - [`ClusterApi`] - Control-plane seam (in-memory, or Kubernetes with the
//!   `kube` feature)
//! - [`LabelSelector`] - Workload selector rendering, parsing and matching
//! - [`TailConfig`] - TOML configuration with validation
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tailmerge::{InMemoryCluster, LogTail, MemoryInstance, RetrievalOptions, TailConfig};
//!
//! # tokio_test_block(async {
//! let cluster = InMemoryCluster::new();
//! cluster.add_instance(
//!     "default",
//!     MemoryInstance::new("api-0")
//!         .with_lines("app", ["2019-04-08T12:25:45.000000001Z listening on :8080"]),
//! );
//!
//! let tail = LogTail::new(Arc::new(cluster), TailConfig::default())?;
//! let records = tail.instance_logs("api-0", &RetrievalOptions::new().tail(50)).await?;
//! assert_eq!(records.as_slice()[0].content(), "listening on :8080");
//! # Ok::<(), tailmerge::TailError>(())
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod collector;
pub mod config;
pub mod error;
pub mod facade;
pub mod fetcher;
#[cfg(feature = "kube")]
pub mod kubernetes;
pub mod memory;
pub mod normalizer;
pub mod selector;
pub mod types;

// Re-export main types
pub use cluster::{ClusterApi, ClusterFuture, InstanceDescriptor, LogStream, LogStreamParams};
pub use collector::{merge, CollectPhase, WorkloadCollector};
pub use config::{TailConfig, DEFAULT_LIMIT_BYTES, DEFAULT_NAMESPACE, DEFAULT_TAIL_LINES};
pub use error::{ResourceKind, Result, TailError};
pub use facade::{InstanceTail, LogTail, TailFuture, TailLogs, TailScope, WorkloadTail};
pub use fetcher::SourceFetcher;
#[cfg(feature = "kube")]
pub use kubernetes::KubeCluster;
pub use memory::{InMemoryCluster, MemoryInstance, MemoryWorkload, StreamRequest};
pub use normalizer::{normalize, normalize_line};
pub use selector::{LabelSelector, Operator, Requirement};
pub use types::{LogRecord, LogTimestamp, RecordBody, RecordSequence, RetrievalOptions};
