//! Command implementations.

mod logs;

pub use logs::{connect, LogsCommand};
