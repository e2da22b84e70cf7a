//! # tailmerge-cli
//!
//! Command-line client for the `tailmerge` retrieval engine.
//!
//! Provides commands for:
//! - Single-instance log retrieval
//! - Merged workload log retrieval
//!
//! # Architecture
//!
//! The CLI builds a [`tailmerge::LogTail`] over either a JSON cluster fixture
//! or, with the `kube` feature, the Kubernetes API server from the ambient
//! kubeconfig.
//!
//! ```text
//! ┌───────────────┐                 ┌──────────────────┐
//! │ tailmerge CLI │────LogTail─────►│ fixture | kube   │
//! └───────────────┘                 └──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, TailArgs};
pub use error::CliError;
pub use output::{OutputFormat, RecordTable};
