//! Logs command implementation.
//!
//! Handles instance and workload log retrieval.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tailmerge::{ClusterApi, InMemoryCluster, LogTail, TailConfig};
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::{OutputFormat, RecordTable};

/// Handler for the `instance` and `workload` commands.
pub struct LogsCommand {
    tail: LogTail<dyn ClusterApi>,
}

impl LogsCommand {
    /// Creates a new logs command handler.
    #[must_use]
    pub const fn new(tail: LogTail<dyn ClusterApi>) -> Self {
        Self { tail }
    }

    /// Executes the command and writes the records to `out`.
    ///
    /// # Errors
    ///
    /// Returns error if retrieval or output fails.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &Commands,
    ) -> Result<(), CliError> {
        let args = command.args();
        let retriever = self.tail.scoped(command.scope());
        let records = retriever.tail(&args.id, &args.options()).await?;

        info!(
            scope = %retriever.scope(),
            id = %args.id,
            records = records.len(),
            errors = records.error_count(),
            "retrieved logs"
        );
        format.write(out, &RecordTable::new(records))
    }
}

/// Builds the retrieval engine described by the global flags.
///
/// The config file is read first; `--namespace` overrides it.
///
/// # Errors
///
/// Returns error if the config or fixture cannot be loaded, or no cluster is
/// available.
pub async fn connect(cli: &Cli) -> Result<LogTail<dyn ClusterApi>, CliError> {
    let config = load_config(cli)?;
    let cluster = open_cluster(cli.fixture.as_deref()).await?;
    debug!(namespace = %config.namespace, "retrieval engine ready");
    Ok(LogTail::new(cluster, config)?)
}

fn load_config(cli: &Cli) -> Result<TailConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => TailConfig::from_file(path)?,
        None => TailConfig::default(),
    };
    if let Some(namespace) = &cli.namespace {
        config.namespace.clone_from(namespace);
    }
    Ok(config)
}

async fn open_cluster(fixture: Option<&Path>) -> Result<Arc<dyn ClusterApi>, CliError> {
    if let Some(path) = fixture {
        debug!(path = %path.display(), "loading cluster fixture");
        return Ok(Arc::new(InMemoryCluster::from_file(path)?));
    }
    live_cluster().await
}

#[cfg(feature = "kube")]
async fn live_cluster() -> Result<Arc<dyn ClusterApi>, CliError> {
    Ok(Arc::new(tailmerge::KubeCluster::try_default().await?))
}

#[cfg(not(feature = "kube"))]
async fn live_cluster() -> Result<Arc<dyn ClusterApi>, CliError> {
    Err(CliError::Config(
        "no cluster available: pass --fixture or build with the `kube` feature".into(),
    ))
}
