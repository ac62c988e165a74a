//! Run state persistence.
//!
//! The state file is written to a temp file and renamed into place, so a
//! reader never sees a half-written state.

use crate::error::{Result, StateError};
use crate::state::RunState;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the persisted run state inside the state directory
pub const STATE_FILE_NAME: &str = "last_run.json";

/// Persists the state of the last orchestrated run
#[derive(Debug, Clone)]
pub struct StateManager {
    state_file_path: PathBuf,
}

impl StateManager {
    /// Manager for the state file inside `state_dir`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_file_path: state_dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.state_file_path
    }

    /// Check if a state file exists
    pub fn exists(&self) -> bool {
        self.state_file_path.exists()
    }

    /// Save `state`, bumping its save version
    pub fn save(&self, state: &mut RunState) -> Result<()> {
        state.validate()?;
        state.save_version += 1;

        let serialized =
            serde_json::to_string_pretty(state).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to serialize state: {}", e),
            })?;

        if let Some(parent) = self.state_file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to create {}: {}", parent.display(), e),
            })?;
        }

        let temp_file_path = self.state_file_path.with_extension("tmp");
        {
            let mut file =
                fs::File::create(&temp_file_path).map_err(|e| StateError::SaveFailed {
                    reason: format!("Failed to create temp file: {}", e),
                })?;

            file.write_all(serialized.as_bytes())
                .map_err(|e| StateError::SaveFailed {
                    reason: format!("Failed to write state: {}", e),
                })?;

            file.sync_all().map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to sync file: {}", e),
            })?;
        }

        fs::rename(&temp_file_path, &self.state_file_path).map_err(|e| StateError::SaveFailed {
            reason: format!("Failed to rename temp file: {}", e),
        })?;

        log::debug!(
            "Saved run state v{} to {}",
            state.save_version,
            self.state_file_path.display()
        );
        Ok(())
    }

    /// Load the last saved state
    pub fn load(&self) -> Result<RunState> {
        let contents = match fs::read_to_string(&self.state_file_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound.into());
            }
            Err(e) => return Err(e.into()),
        };

        let state: RunState =
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
                reason: format!("Failed to deserialize state: {}", e),
            })?;
        state.validate()?;
        Ok(state)
    }

    /// Delete the state file
    pub fn cleanup(&self) -> Result<()> {
        if self.state_file_path.exists() {
            fs::remove_file(&self.state_file_path).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to remove state file: {}", e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunPhase;
    use crate::trigger::Trigger;

    #[test]
    fn saves_and_loads_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path().join("state"));
        assert!(!manager.exists());

        let mut state = RunState::new(
            Trigger::Tag {
                tag: "v1.0.0".to_string(),
            },
            false,
        );
        state.set_phase(RunPhase::Completed);
        state.published_url = Some("https://jane.github.io/cv/".to_string());
        manager.save(&mut state).unwrap();
        manager.save(&mut state).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(loaded.save_version, 2);
        assert_eq!(loaded.phase, RunPhase::Completed);
        assert_eq!(loaded.published_url, state.published_url);
        assert!(!manager.path().with_extension("tmp").exists());
    }

    #[test]
    fn missing_state_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = StateManager::new(dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("No run recorded yet"), "{err}");
    }

    #[test]
    fn garbage_is_reported_as_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path());
        fs::write(manager.path(), "{not json").unwrap();
        let err = manager.load().unwrap_err();
        assert!(err.to_string().contains("corrupted"), "{err}");

        manager.cleanup().unwrap();
        assert!(!manager.exists());
    }
}
