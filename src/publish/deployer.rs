//! Deployment backends.

use super::lock::DeploymentPermit;
use crate::error::{PublishError, Result};
use crate::site::Site;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Puts a built site in front of visitors
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Short description used in logs, e.g. `directory /srv/www/cv`
    fn describe(&self) -> String;

    /// Public URL when none is configured
    fn default_base_url(&self) -> Option<String>;

    /// Deploy `site`. Implementations call `permit.checkpoint()` between
    /// steps and stop when it fails.
    async fn deploy(&self, site: &Site, permit: &DeploymentPermit) -> Result<()>;
}

/// Copies the site into a directory served by a web server.
///
/// The new tree is assembled next to the destination and swapped in with
/// two renames, so visitors never see a half-copied site.
#[derive(Debug, Clone)]
pub struct DirectoryDeployer {
    destination: PathBuf,
}

impl DirectoryDeployer {
    /// Deployer writing to `destination`
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "site".to_string());
        self.destination.with_file_name(format!(".{name}.{suffix}"))
    }

    fn failed(&self, permit: &DeploymentPermit, reason: impl std::fmt::Display) -> PublishError {
        PublishError::DeployFailed {
            target: permit.target().to_string(),
            reason: format!("{}: {}", self.destination.display(), reason),
        }
    }
}

#[async_trait]
impl Deployer for DirectoryDeployer {
    fn describe(&self) -> String {
        format!("directory {}", self.destination.display())
    }

    fn default_base_url(&self) -> Option<String> {
        let absolute = std::path::absolute(&self.destination).ok()?;
        url::Url::from_directory_path(absolute)
            .ok()
            .map(|url| url.to_string())
    }

    async fn deploy(&self, site: &Site, permit: &DeploymentPermit) -> Result<()> {
        if let Some(parent) = self.destination.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let incoming = self.sibling(&format!("incoming-{}", permit.ticket()));
        let previous = self.sibling(&format!("previous-{}", permit.ticket()));
        remove_dir_if_exists(&incoming)?;
        remove_dir_if_exists(&previous)?;

        let copied = copy_tree(&site.root, &incoming, permit);
        if let Err(e) = copied {
            remove_dir_if_exists(&incoming)?;
            return Err(e);
        }

        if let Err(e) = permit.checkpoint() {
            remove_dir_if_exists(&incoming)?;
            return Err(e);
        }

        if self.destination.exists() {
            std::fs::rename(&self.destination, &previous).map_err(|e| self.failed(permit, e))?;
        }
        if let Err(e) = std::fs::rename(&incoming, &self.destination) {
            // put the old site back
            if previous.exists() {
                let _ = std::fs::rename(&previous, &self.destination);
            }
            return Err(self.failed(permit, e).into());
        }
        remove_dir_if_exists(&previous)?;

        log::info!(
            "Deployed {} file(s) to {}",
            site.files.len(),
            self.destination.display()
        );
        Ok(())
    }
}

/// Copy `from` into `to`, checking the permit after every file
pub(crate) fn copy_tree(from: &Path, to: &Path, permit: &DeploymentPermit) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| anyhow::anyhow!("failed to walk {}: {e}", from.display()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            permit.checkpoint()?;
        }
    }
    Ok(())
}

fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
