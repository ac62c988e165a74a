//! Orchestrated run state tracking and serialization.

use crate::error::{Result, StateError};
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};

/// Current version of the state format
pub const STATE_FORMAT_VERSION: u32 = 1;

/// State of one orchestrated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Version of the state format
    pub format_version: u32,
    /// Incremented on every save
    pub save_version: u64,
    /// Unique ID for this run
    pub run_id: String,
    /// What started the run
    pub trigger: Trigger,
    /// Timestamp when the run started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Timestamp of the last update
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Current phase
    pub phase: RunPhase,
    /// Checkpoints passed so far
    pub checkpoints: Vec<RunCheckpoint>,
    /// Errors recorded during the run
    pub errors: Vec<RunError>,
    /// URL of the published site
    pub published_url: Option<String>,
    /// URL of the created release
    pub release_url: Option<String>,
    /// Whether this was a dry run
    #[serde(default)]
    pub dry_run: bool,
}

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Planned, nothing started
    Pending,
    /// Rendering every language and publishing the site
    RenderingAndPublishing,
    /// Creating the release record
    Releasing,
    /// Finished successfully (or skipped)
    Completed,
    /// A stage failed
    Failed,
    /// Deployment lost to a newer run
    Cancelled,
}

/// Checkpoint reached during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Checkpoint name
    pub name: String,
    /// Phase the checkpoint belongs to
    pub phase: RunPhase,
    /// When it was reached
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Extra data
    pub data: Option<serde_json::Value>,
}

/// Error recorded during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    /// Error message
    pub message: String,
    /// Phase where it happened
    pub phase: RunPhase,
    /// When it happened
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Whether retrying could help
    pub recoverable: bool,
}

impl RunState {
    /// Fresh state for a run started by `trigger`
    pub fn new(trigger: Trigger, dry_run: bool) -> Self {
        let now = chrono::Utc::now();
        Self {
            format_version: STATE_FORMAT_VERSION,
            save_version: 0,
            run_id: format!("run-{}-{}", trigger.name(), now.timestamp_millis()),
            trigger,
            started_at: now,
            updated_at: now,
            phase: RunPhase::Pending,
            checkpoints: Vec::new(),
            errors: Vec::new(),
            published_url: None,
            release_url: None,
            dry_run,
        }
    }

    /// Record a checkpoint in the current phase
    pub fn add_checkpoint(&mut self, name: impl Into<String>, data: Option<serde_json::Value>) {
        self.checkpoints.push(RunCheckpoint {
            name: name.into(),
            phase: self.phase,
            timestamp: chrono::Utc::now(),
            data,
        });
        self.updated_at = chrono::Utc::now();
    }

    /// Move to another phase
    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = chrono::Utc::now();
    }

    /// Record an error in the current phase
    pub fn add_error(&mut self, message: impl Into<String>, recoverable: bool) {
        self.errors.push(RunError {
            message: message.into(),
            phase: self.phase,
            timestamp: chrono::Utc::now(),
            recoverable,
        });
        self.updated_at = chrono::Utc::now();
    }

    /// Whether a checkpoint with this name was reached
    pub fn has_checkpoint(&self, name: &str) -> bool {
        self.checkpoints.iter().any(|cp| cp.name == name)
    }

    /// True once the run can no longer change
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            RunPhase::Completed | RunPhase::Failed | RunPhase::Cancelled
        )
    }

    /// Time between start and last update
    pub fn elapsed_time(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Check the format version
    pub fn validate(&self) -> Result<()> {
        if self.format_version != STATE_FORMAT_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_FORMAT_VERSION.to_string(),
                found: self.format_version.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Run {} ({}) - {} - {} elapsed{}",
            self.run_id,
            self.trigger.name(),
            self.phase,
            format_duration(self.elapsed_time()),
            if self.dry_run { " [dry run]" } else { "" }
        )
    }
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Pending => write!(f, "Pending"),
            RunPhase::RenderingAndPublishing => write!(f, "Rendering and publishing"),
            RunPhase::Releasing => write!(f, "Releasing"),
            RunPhase::Completed => write!(f, "Completed"),
            RunPhase::Failed => write!(f, "Failed"),
            RunPhase::Cancelled => write!(f, "Cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_trigger() -> Trigger {
        Trigger::Tag {
            tag: "v1.0.0".to_string(),
        }
    }

    #[test]
    fn checkpoints_and_errors_carry_the_current_phase() {
        let mut state = RunState::new(tag_trigger(), false);
        assert_eq!(state.phase, RunPhase::Pending);
        assert!(state.run_id.starts_with("run-tag-"));

        state.set_phase(RunPhase::RenderingAndPublishing);
        state.add_checkpoint("rendered", None);
        state.set_phase(RunPhase::Releasing);
        state.add_error("rate limited", true);

        assert!(state.has_checkpoint("rendered"));
        assert_eq!(state.checkpoints[0].phase, RunPhase::RenderingAndPublishing);
        assert_eq!(state.errors[0].phase, RunPhase::Releasing);
        assert!(!state.is_finished());

        state.set_phase(RunPhase::Cancelled);
        assert!(state.is_finished());
    }

    #[test]
    fn rejects_other_format_versions() {
        let mut state = RunState::new(tag_trigger(), false);
        assert!(state.validate().is_ok());
        state.format_version = 99;
        assert!(state.validate().is_err());
    }

    #[test]
    fn summary_mentions_phase_and_dry_run() {
        let mut state = RunState::new(tag_trigger(), true);
        state.set_phase(RunPhase::Completed);
        let summary = state.summary();
        assert!(summary.contains("(tag)"), "{summary}");
        assert!(summary.contains("Completed"), "{summary}");
        assert!(summary.ends_with("[dry run]"), "{summary}");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(chrono::Duration::seconds(5)), "5s");
        assert_eq!(format_duration(chrono::Duration::seconds(65)), "1m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3725)), "1h 2m 5s");
    }
}
