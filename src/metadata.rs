//! Build metadata recorded next to every render artifact.

use crate::EnvConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Who built what, when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    /// Source revision the artifacts were built from
    pub commit: Option<String>,
    /// When the render ran
    pub timestamp: DateTime<Utc>,
    /// Account or user that triggered the build
    pub actor: Option<String>,
    /// Link to the CI run, when built in CI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_url: Option<String>,
}

impl BuildMetadata {
    /// Detect metadata from the CI environment, falling back to the local
    /// git checkout and the login name.
    pub async fn detect(env: &EnvConfig, repo_dir: &Path) -> Self {
        let commit = match env.get("GITHUB_SHA") {
            Some(sha) => Some(sha),
            None => head_commit(repo_dir).await,
        };
        let actor = env.first_of(&["GITHUB_ACTOR", "USER", "USERNAME"]);
        let run_url = match (
            env.get("GITHUB_SERVER_URL"),
            env.get("GITHUB_REPOSITORY"),
            env.get("GITHUB_RUN_ID"),
        ) {
            (Some(server), Some(repo), Some(run)) => {
                Some(format!("{}/{}/actions/runs/{}", server.trim_end_matches('/'), repo, run))
            }
            _ => None,
        };

        Self {
            commit,
            timestamp: Utc::now(),
            actor,
            run_url,
        }
    }

    /// Abbreviated commit for display
    pub fn short_commit(&self) -> Option<&str> {
        self.commit
            .as_deref()
            .map(|sha| match sha.char_indices().nth(7) {
                Some((end, _)) => &sha[..end],
                None => sha,
            })
    }
}

async fn head_commit(repo_dir: &Path) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        log::debug!("git rev-parse HEAD failed in {}", repo_dir.display());
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
