//! Publish stage: build the static site and deploy it under the target lock.

mod deployer;
mod git_branch;
mod lock;

pub use deployer::{Deployer, DirectoryDeployer};
pub use git_branch::GitBranchDeployer;
pub use lock::{DeploymentGate, DeploymentPermit};

use crate::EnvConfig;
use crate::config::{DeployMethod, Settings};
use crate::error::{PublishError, Result};
use crate::render::RenderOutput;
use crate::site::SiteBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Public base URL, ending in `/`
    pub base_url: String,
    /// Deployment target name
    pub target: String,
    /// Files deployed, relative to the base URL
    pub files: Vec<String>,
    /// Whether deployment was skipped (`--dry-run`)
    pub dry_run: bool,
}

/// Builds the site from render output and deploys it
pub struct Publisher<'a> {
    settings: &'a Settings,
    gate: DeploymentGate,
    deployer: Arc<dyn Deployer>,
    accent: Option<String>,
    dry_run: bool,
}

impl<'a> Publisher<'a> {
    /// Publisher using an explicit deployer
    pub fn new(settings: &'a Settings, deployer: Arc<dyn Deployer>) -> Self {
        Self {
            settings,
            gate: DeploymentGate::new(settings.lock_dir(), settings.publish.concurrency),
            deployer,
            accent: None,
            dry_run: false,
        }
    }

    /// Publisher using the configured deployment method
    pub fn from_settings(
        settings: &'a Settings,
        env: &EnvConfig,
        repo_root: &Path,
        repository: Option<String>,
    ) -> Self {
        let deployer: Arc<dyn Deployer> = match &settings.publish.deploy {
            DeployMethod::Directory { path } => Arc::new(DirectoryDeployer::new(path)),
            DeployMethod::GitBranch { remote, branch } => {
                let message = match env.get("GITHUB_SHA") {
                    Some(sha) => format!("Publish site from {sha}"),
                    None => "Publish site".to_string(),
                };
                Arc::new(
                    GitBranchDeployer::new(repo_root, &settings.state_dir, remote, branch)
                        .with_repository(repository)
                        .with_token(env.first_of(&["GH_TOKEN", "GITHUB_TOKEN"]))
                        .with_message(message),
                )
            }
        };
        Self::new(settings, deployer)
    }

    /// Replace the gate (tests shorten its poll interval)
    pub fn with_gate(mut self, gate: DeploymentGate) -> Self {
        self.gate = gate;
        self
    }

    /// Link color of the landing page
    pub fn with_accent(mut self, accent: Option<String>) -> Self {
        self.accent = accent;
        self
    }

    /// Build and lock, but do not deploy
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish every language of `output`.
    ///
    /// Fails with [`PublishError::Superseded`] when a newer deployment to the
    /// same target takes over under the preempt policy.
    pub async fn publish(&self, output: &RenderOutput) -> Result<PublishResult> {
        let target = self.settings.publish.target.clone();
        let base_url = self
            .settings
            .publish
            .base_url_or(self.deployer.default_base_url())
            .ok_or_else(|| PublishError::MissingBaseUrl {
                target: target.clone(),
            })?;

        let staging = output.dir().join("site");
        let site = SiteBuilder::new(self.settings)
            .with_accent(self.accent.clone())
            .build(output, &staging)?;

        let permit = self.gate.enter(&target).await?;
        permit.checkpoint()?;

        if self.dry_run {
            log::info!(
                "Dry run: would deploy {} file(s) via {}",
                site.files.len(),
                self.deployer.describe()
            );
        } else {
            log::info!("Deploying to '{}' via {}", target, self.deployer.describe());
            self.deployer.deploy(&site, &permit).await?;
        }

        Ok(PublishResult {
            base_url,
            target,
            files: site.files,
            dry_run: self.dry_run,
        })
    }
}
