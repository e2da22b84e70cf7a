//! Tailmerge CLI binary entrypoint.
//!
//! This is the main entry point for the `tailmerge` command-line tool.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tailmerge_cli::cli::Cli;
use tailmerge_cli::commands::{connect, LogsCommand};
use tailmerge_cli::output::OutputFormat;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), tailmerge_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let tail = connect(&cli).await?;
    let mut stdout = io::stdout().lock();

    LogsCommand::new(tail)
        .execute(&mut stdout, &format, &cli.command)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailmerge_cli::cli::{Commands, Format};

    #[test]
    fn cli_parses_workload() {
        let cli = Cli::parse_from(["tailmerge", "workload", "api"]);
        assert!(matches!(cli.command, Commands::Workload(_)));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["tailmerge", "--format", "json", "instance", "api-0"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[test]
    fn cli_respects_verbose_flag() {
        let cli = Cli::parse_from(["tailmerge", "-v", "instance", "api-0"]);
        assert!(cli.verbose);
    }

    #[tokio::test]
    async fn run_with_missing_fixture_fails() {
        let cli = Cli::parse_from([
            "tailmerge",
            "--fixture",
            "/nonexistent/cluster.json",
            "instance",
            "api-0",
        ]);
        let result = run(cli).await;
        assert!(result.is_err());
    }
}
