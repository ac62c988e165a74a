//! Status command implementation.
//!
//! Displays the state of the last orchestrated run.

use super::CommandContext;
use crate::cli::RuntimeConfig;
use crate::error::Result;
use crate::state::StateManager;

/// Execute status command
pub(super) fn execute_status(
    json: bool,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    let manager = StateManager::new(&context.settings.state_dir);

    if !manager.exists() {
        if json {
            println!("{{\"status\": \"no_run_recorded\"}}");
        } else {
            config.println("No run recorded yet");
        }
        return Ok(0);
    }

    let state = manager.load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(0);
    }

    config.println(&state.summary());
    config.println(&format!("Started: {}", state.started_at));
    config.println(&format!("Updated: {}", state.updated_at));
    if let Some(url) = &state.published_url {
        config.println(&format!("Site: {}", url));
    }
    if let Some(url) = &state.release_url {
        config.println(&format!("Release: {}", url));
    }

    if !state.checkpoints.is_empty() {
        config.println("\nCheckpoints:");
        for checkpoint in &state.checkpoints {
            config.indent(&format!("✓ {} ({})", checkpoint.name, checkpoint.phase));
        }
    }

    if !state.errors.is_empty() {
        config.println("\nErrors:");
        for error in &state.errors {
            let kind = if error.recoverable {
                "recoverable"
            } else {
                "fatal"
            };
            config.indent(&format!("✗ {} ({}, {})", error.message, error.phase, kind));
        }
    }
    Ok(0)
}
