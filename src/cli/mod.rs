//! Command line interface for cv_release.
//!
//! Parses arguments, loads settings and hands off to the pipeline, turning
//! the outcome into an exit code: 0 on success or skipped runs, 1 on failure,
//! 2 when a deployment was superseded by a newer one.

mod args;
pub mod commands;
mod output;
mod retry_config;

pub use args::{Args, Command, Event, RuntimeConfig};
pub use commands::execute_command;
pub use output::OutputManager;
pub use retry_config::RetryConfig;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
