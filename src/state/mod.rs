//! Run state tracking and persistence.
//!
//! Every orchestrated run records its phase, checkpoints and errors so
//! `cv_release status` can report on the last run.

mod manager;
mod run_state;

pub use manager::{STATE_FILE_NAME, StateManager};
pub use run_state::{RunCheckpoint, RunError, RunPhase, RunState, STATE_FORMAT_VERSION};
