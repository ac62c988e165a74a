//! Publishing by force-pushing the site to a branch (GitHub Pages).

use super::deployer::{Deployer, copy_tree};
use super::lock::DeploymentPermit;
use crate::config::github_pages_url;
use crate::error::{PublishError, Result};
use crate::site::Site;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

const COMMITTER_NAME: &str = "cv_release";
const COMMITTER_EMAIL: &str = "cv_release@users.noreply.github.com";

/// Commits the site as the single commit of a branch and force-pushes it
#[derive(Clone)]
pub struct GitBranchDeployer {
    repo_root: PathBuf,
    work_dir: PathBuf,
    remote: String,
    branch: String,
    repository: Option<String>,
    token: Option<String>,
    message: String,
}

impl std::fmt::Debug for GitBranchDeployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitBranchDeployer")
            .field("repo_root", &self.repo_root)
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .field("repository", &self.repository)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl GitBranchDeployer {
    /// Deployer pushing to `remote`/`branch` of the checkout at `repo_root`.
    ///
    /// `work_dir` receives a throwaway repository per deployment.
    pub fn new(
        repo_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            work_dir: work_dir.into(),
            remote: remote.into(),
            branch: branch.into(),
            repository: None,
            token: None,
            message: "Publish site".to_string(),
        }
    }

    /// `owner/repo`, used to derive the Pages URL
    pub fn with_repository(mut self, repository: Option<String>) -> Self {
        self.repository = repository;
        self
    }

    /// Token injected into HTTPS remotes
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Commit message of the published commit
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    async fn push_url(&self, permit: &DeploymentPermit) -> Result<String> {
        let url = git(&self.repo_root, &["remote", "get-url", self.remote.as_str()])
            .await
            .map_err(|reason| failed(permit, reason))?;
        Ok(match &self.token {
            Some(token) => with_token(&url, token),
            None => url,
        })
    }

    async fn run(&self, site: &Site, permit: &DeploymentPermit, work: &Path) -> Result<()> {
        let tree = work.join("tree");
        // Bare, so every step names the tree explicitly with --work-tree
        let git_dir = work.join("git");
        copy_tree(&site.root, &tree, permit)?;

        let git_dir_arg = format!("--git-dir={}", git_dir.display());
        let tree_arg = format!("--work-tree={}", tree.display());
        let head = format!("refs/heads/{}", self.branch);
        let name = format!("user.name={COMMITTER_NAME}");
        let email = format!("user.email={COMMITTER_EMAIL}");
        let git_dir_path = git_dir.to_string_lossy();

        let steps: [Vec<&str>; 4] = [
            vec!["init", "-q", "--bare", git_dir_path.as_ref()],
            vec![git_dir_arg.as_str(), "symbolic-ref", "HEAD", head.as_str()],
            vec![git_dir_arg.as_str(), tree_arg.as_str(), "add", "--all"],
            vec![
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                git_dir_arg.as_str(),
                tree_arg.as_str(),
                "commit",
                "-q",
                "-m",
                self.message.as_str(),
            ],
        ];
        for args in &steps {
            git(work, args).await.map_err(|reason| failed(permit, reason))?;
            permit.checkpoint()?;
        }

        let url = self.push_url(permit).await?;
        let refspec = format!("HEAD:{head}");
        git(
            work,
            &[git_dir_arg.as_str(), "push", "--force", "-q", url.as_str(), refspec.as_str()],
        )
        .await
        .map_err(|reason| failed(permit, redact(&reason, self.token.as_deref())))?;
        Ok(())
    }
}

#[async_trait]
impl Deployer for GitBranchDeployer {
    fn describe(&self) -> String {
        format!("branch {} of {}", self.branch, self.remote)
    }

    fn default_base_url(&self) -> Option<String> {
        self.repository.as_deref().and_then(github_pages_url)
    }

    async fn deploy(&self, site: &Site, permit: &DeploymentPermit) -> Result<()> {
        let work = self.work_dir.join(format!("pages-{}", permit.ticket()));
        if work.exists() {
            std::fs::remove_dir_all(&work)?;
        }
        std::fs::create_dir_all(&work)?;

        let result = self.run(site, permit, &work).await;
        if let Err(e) = std::fs::remove_dir_all(&work) {
            log::debug!("Could not remove {}: {e}", work.display());
        }
        result?;

        log::info!("Pushed {} file(s) to {}", site.files.len(), self.describe());
        Ok(())
    }
}

/// Run git, returning trimmed stdout or the stderr as the failure reason
async fn git(cwd: &Path, args: &[&str]) -> std::result::Result<String, String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| format!("failed to run git: {e}"))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(format!(
            "git {} failed: {}",
            args.iter()
                .find(|a| !a.starts_with('-') && !a.contains('='))
                .unwrap_or(&""),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

fn failed(permit: &DeploymentPermit, reason: String) -> PublishError {
    PublishError::DeployFailed {
        target: permit.target().to_string(),
        reason,
    }
}

/// Put the token into an HTTPS remote URL; other URLs are left alone
fn with_token(url: &str, token: &str) -> String {
    match url.strip_prefix("https://") {
        Some(rest) if !rest.contains('@') => format!("https://x-access-token:{token}@{rest}"),
        _ => url.to_string(),
    }
}

fn redact(message: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => message.replace(token, "***"),
        _ => message.to_string(),
    }
}
