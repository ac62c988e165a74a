//! GitHub integration: release hosting and repository detection.

mod client;
mod memory;

pub use client::GitHubReleaseHost;
pub use memory::MemoryReleaseHost;

use crate::EnvConfig;
use crate::config::Settings;
use std::path::Path;

/// Repository the CV lives in, as `owner/repo`.
///
/// Taken from `release.repository`, then `GITHUB_REPOSITORY`, then the
/// `origin` remote of the checkout at `repo_root`.
pub async fn resolve_repository(settings: &Settings, env: &EnvConfig, repo_root: &Path) -> Option<String> {
    if let Some(repository) = &settings.release.repository {
        return Some(repository.clone());
    }
    if let Some(repository) = env.get("GITHUB_REPOSITORY") {
        return Some(repository);
    }

    let output = tokio::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(repo_root)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let (owner, repo) = parse_github_url(&url)?;
    log::debug!("Detected repository {owner}/{repo} from origin");
    Some(format!("{owner}/{repo}"))
}

/// Parse owner and repository name from a GitHub remote URL.
///
/// Supports `git@github.com:owner/repo.git`, `ssh://git@github.com/owner/repo`
/// and `https://github.com/owner/repo.git` (with or without credentials).
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let path = if let Some(rest) = url.strip_prefix("git@github.com:") {
        rest
    } else {
        let (_, rest) = url.split_once("github.com/")?;
        rest
    };
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
