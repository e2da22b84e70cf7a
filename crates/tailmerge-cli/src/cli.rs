//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tailmerge::{RetrievalOptions, TailScope};

/// Tailmerge - bounded, merged log retrieval for cluster workloads.
#[derive(Parser, Debug, Clone)]
#[command(name = "tailmerge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Namespace to read from. Overrides the config file.
    #[arg(short, long, env = "TAILMERGE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short, long, env = "TAILMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve logs from a JSON cluster fixture instead of a live cluster.
    #[arg(long, env = "TAILMERGE_FIXTURE")]
    pub fixture: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log retrieval progress to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the logs of a single instance.
    Instance(TailArgs),

    /// Show the merged logs of every instance of a workload.
    ///
    /// Instances that fail are reported as error records; the rest are
    /// still shown.
    Workload(TailArgs),
}

impl Commands {
    /// Returns the retrieval scope of this command.
    #[must_use]
    pub const fn scope(&self) -> TailScope {
        match self {
            Self::Instance(_) => TailScope::Instance,
            Self::Workload(_) => TailScope::Workload,
        }
    }

    /// Returns the retrieval arguments.
    #[must_use]
    pub const fn args(&self) -> &TailArgs {
        match self {
            Self::Instance(args) | Self::Workload(args) => args,
        }
    }
}

/// Arguments shared by both retrieval commands.
#[derive(Args, Debug, Clone)]
pub struct TailArgs {
    /// Instance or workload name.
    pub id: String,

    /// Only show entries logged after this RFC3339 time. Replaces --tail.
    #[arg(short, long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,

    /// Number of trailing lines per source (0 uses the configured default).
    #[arg(short, long, default_value_t = 0)]
    pub tail: i64,

    /// Byte cap per source (0 uses the configured default).
    #[arg(long, default_value_t = 0)]
    pub limit_bytes: i64,

    /// Keep only the newest N records overall (0 keeps everything).
    #[arg(long, default_value_t = 0)]
    pub limit_lines: i64,

    /// Read this channel instead of each instance's first one.
    #[arg(long)]
    pub channel: Option<String>,
}

impl TailArgs {
    /// Converts the arguments into retrieval options.
    #[must_use]
    pub fn options(&self) -> RetrievalOptions {
        let mut options = RetrievalOptions::new()
            .tail(self.tail)
            .with_limit_bytes(self.limit_bytes)
            .with_limit_lines(self.limit_lines);
        if let Some(since) = self.since {
            options = options.since(since);
        }
        if let Some(channel) = &self.channel {
            options = options.with_channel(channel.clone());
        }
        options
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC3339 time such as 2019-04-08T12:25:45Z: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_instance_with_defaults() {
        let cli = Cli::parse_from(["tailmerge", "instance", "api-0"]);
        assert_eq!(cli.command.scope(), TailScope::Instance);
        assert_eq!(cli.format, Format::Table);
        assert!(!cli.verbose);

        let options = cli.command.args().options();
        assert_eq!(options, RetrievalOptions::new());
    }

    #[test]
    fn parses_workload_options() {
        let cli = Cli::parse_from([
            "tailmerge",
            "--namespace",
            "shop",
            "--format",
            "json",
            "workload",
            "cart",
            "--since",
            "2019-04-08T12:25:45Z",
            "--limit-bytes",
            "4096",
            "--limit-lines",
            "10",
            "--channel",
            "sidecar",
        ]);
        assert_eq!(cli.command.scope(), TailScope::Workload);
        assert_eq!(cli.namespace.as_deref(), Some("shop"));
        assert_eq!(cli.format, Format::Json);

        let args = cli.command.args();
        assert_eq!(args.id, "cart");
        let options = args.options();
        assert_eq!(
            options.from_time,
            Utc.with_ymd_and_hms(2019, 4, 8, 12, 25, 45).single()
        );
        assert_eq!(options.limit_bytes, 4096);
        assert_eq!(options.limit_lines, 10);
        assert_eq!(options.channel.as_deref(), Some("sidecar"));
    }

    #[test]
    fn rejects_malformed_since() {
        let result = Cli::try_parse_from(["tailmerge", "instance", "api-0", "--since", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn requires_subcommand() {
        assert!(Cli::try_parse_from(["tailmerge"]).is_err());
    }
}
