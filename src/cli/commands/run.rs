//! Run command implementation.
//!
//! Turns the command line (or the CI environment) into a [`Trigger`] and
//! runs the stages it calls for.

use super::CommandContext;
use crate::EnvConfig;
use crate::cli::{Command, Event, RuntimeConfig};
use crate::error::{CliError, Result};
use crate::pipeline::RunOutcome;
use crate::trigger::Trigger;
use std::path::PathBuf;

/// Execute run command
pub(super) async fn execute_run(
    command: &Command,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    let trigger = trigger_from(command, &context.env)?;
    config.verbose_println(&format!("Trigger: {}", trigger.name()));

    let report = context.pipeline(config).run(trigger).await?;

    match &report.outcome {
        RunOutcome::Completed => {
            config.success_println(&format!("Run {} completed", report.run_id));
            if let Some(published) = &report.published {
                config.indent(&format!("Site: {}", published.base_url));
            }
            if let Some(release) = &report.release {
                config.indent(&format!("Release: {}", release.html_url));
            }
        }
        RunOutcome::Skipped { reason } => {
            config.println(&format!("Run {} skipped: {}", report.run_id, reason));
        }
        RunOutcome::Superseded => {
            config.warning_println(&format!(
                "Run {} cancelled: a newer deployment took over",
                report.run_id
            ));
        }
    }
    Ok(report.exit_code())
}

/// Trigger described by `run` flags, falling back to the CI environment
fn trigger_from(command: &Command, env: &EnvConfig) -> Result<Trigger> {
    let Command::Run {
        event,
        git_ref,
        changed,
        tag,
        prerelease,
    } = command
    else {
        unreachable!("trigger_from called with non-Run command");
    };

    let tag_from_ref = || {
        git_ref
            .as_deref()
            .and_then(|r| r.strip_prefix("refs/tags/"))
            .map(str::to_string)
    };

    let trigger = match event {
        Some(Event::Push) => Trigger::Push {
            git_ref: git_ref.clone(),
            changed: changed.clone(),
        },
        Some(Event::PullRequest) => Trigger::PullRequest {
            changed: changed.clone(),
        },
        Some(Event::Tag) => Trigger::Tag {
            tag: tag
                .clone()
                .or_else(tag_from_ref)
                .ok_or_else(|| CliError::InvalidArguments {
                    reason: "--event tag needs --tag or --ref refs/tags/<tag>".to_string(),
                })?,
        },
        Some(Event::Manual) => Trigger::Manual {
            tag: tag.clone().or_else(tag_from_ref),
            prerelease: *prerelease,
        },
        None if tag.is_some() => Trigger::Manual {
            tag: tag.clone(),
            prerelease: *prerelease,
        },
        None => with_changes(Trigger::from_env(env)?, changed),
    };
    Ok(trigger)
}

fn with_changes(trigger: Trigger, paths: &[PathBuf]) -> Trigger {
    match trigger {
        Trigger::Push { git_ref, changed } if changed.is_empty() => Trigger::Push {
            git_ref,
            changed: paths.to_vec(),
        },
        Trigger::PullRequest { changed } if changed.is_empty() => Trigger::PullRequest {
            changed: paths.to_vec(),
        },
        other => other,
    }
}
