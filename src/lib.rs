//! # cv_release
//!
//! Render, publish and release a multi-language CV.
//!
//! Each language variant of the CV is a declarative YAML document description.
//! This crate drives an external renderer to turn every description into a
//! PDF, publishes the PDFs behind a small language-selection page, and attaches
//! them to a tagged release with generated notes.
//!
//! ## Stages
//!
//! - **Render**: validate a description, run the renderer, verify the PDF
//! - **Publish**: build the static site, deploy it under a per-target lock
//! - **Release**: create a release record for a version tag, upload assets
//!
//! ## Usage
//!
//! ```bash
//! cv_release validate              # Check every description
//! cv_release render --lang pt      # Render one language
//! cv_release run --tag v1.2.0      # Render, publish and release
//! cv_release status                # Show the last orchestrated run
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod github;
pub mod metadata;
pub mod pipeline;
pub mod publish;
pub mod release;
pub mod render;
pub mod site;
pub mod state;
pub mod trigger;

pub use cli::Args;
pub use config::Settings;
pub use error::{ErrorClass, PipelineError, Result};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use publish::{Publisher, PublishResult};
pub use release::{ReleaseManager, ReleaseRecord, ReleaseRequest};
pub use render::{RenderArtifact, RenderOutput, RenderStage};
pub use state::{RunPhase, RunState, StateManager};
pub use trigger::{RunPlan, Trigger};

use std::collections::HashMap;
use std::ffi::OsString;

/// Snapshot of the process environment.
///
/// Commands read tokens and CI context through this instead of
/// `std::env`, so tests can inject values without touching the real
/// environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    vars: HashMap<String, String>,
}

impl EnvConfig {
    /// Capture the current process environment; variables that are not
    /// valid Unicode are skipped
    pub fn from_env() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, treating empty values as unset
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    /// First variable that is set among `keys`
    pub fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::EnvConfig;

    #[test]
    fn empty_values_count_as_unset() {
        let env = EnvConfig::from_pairs([("GH_TOKEN", ""), ("GITHUB_TOKEN", "abc")]);
        assert_eq!(env.get("GH_TOKEN"), None);
        assert_eq!(
            env.first_of(&["GH_TOKEN", "GITHUB_TOKEN"]),
            Some("abc".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_variables_are_skipped() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let env = EnvConfig::from_os_pairs([
            (OsString::from("GITHUB_ACTOR"), OsString::from("jane")),
            (OsString::from("LANG"), OsString::from_vec(vec![0x66, 0xff, 0x6f])),
            (OsString::from_vec(vec![0xfe, 0x41]), OsString::from("x")),
        ]);
        assert_eq!(env.get("GITHUB_ACTOR"), Some("jane".to_string()));
        assert_eq!(env.get("LANG"), None);
        assert_eq!(env.vars.len(), 1);
    }
}
