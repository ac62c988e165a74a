//! Release stage: one release record per version tag, with the PDFs attached.
//!
//! The record is created as a draft, assets are uploaded, and only then is
//! the draft published, so nobody sees a release with missing files. An
//! existing record for the tag is never touched.

pub mod notes;

use crate::cli::RuntimeConfig;
use crate::config::Settings;
use crate::error::{ReleaseRecordError, Result};
use crate::pipeline::retry_with_backoff;
use crate::render::RenderOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Asset attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name shown on the release
    pub name: String,
    /// Download URL
    pub download_url: String,
    /// Size in bytes
    pub size: u64,
}

/// A release as the host knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Host-assigned id
    pub id: u64,
    /// Tag the release belongs to
    pub tag: String,
    /// Release title
    pub name: String,
    /// Release notes
    pub body: String,
    /// Marked as pre-release
    pub prerelease: bool,
    /// Still a draft
    pub draft: bool,
    /// Web page of the release
    pub html_url: String,
    /// Attached files
    pub assets: Vec<ReleaseAsset>,
}

/// Fields of a new release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRelease {
    /// Tag name
    pub tag: String,
    /// Title
    pub name: String,
    /// Notes
    pub body: String,
    /// Pre-release flag
    pub prerelease: bool,
    /// Commit the tag should point at when it does not exist yet
    pub target_commitish: Option<String>,
}

/// Where release records live
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Release for `tag`, drafts included
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>>;

    /// Create a draft release.
    ///
    /// Fails with [`ReleaseRecordError::AlreadyExists`] when the tag already
    /// has a release.
    async fn create_release(&self, release: &NewRelease) -> Result<ReleaseRecord>;

    /// Attach a file to a release
    async fn upload_asset(&self, release_id: u64, name: &str, content: Vec<u8>) -> Result<ReleaseAsset>;

    /// Turn a draft into a public release
    async fn publish_release(&self, release_id: u64) -> Result<ReleaseRecord>;
}

/// Input of [`ReleaseManager::create`]
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Version tag, e.g. `v1.2.0`
    pub tag: String,
    /// Mark as pre-release
    pub prerelease: bool,
    /// Published site, when the publish stage ran
    pub url: Option<String>,
}

/// A PDF ready to be attached
#[derive(Debug, Clone)]
pub struct PlannedAsset {
    /// Language code
    pub language: String,
    /// Label of the language
    pub label: String,
    /// Asset name on the release
    pub name: String,
    /// Local file
    pub path: PathBuf,
    /// SHA-256 of the file
    pub sha256: String,
}

/// Creates release records on a [`ReleaseHost`]
pub struct ReleaseManager<'a> {
    settings: &'a Settings,
    host: &'a dyn ReleaseHost,
    runtime: &'a RuntimeConfig,
}

impl<'a> ReleaseManager<'a> {
    /// Manager creating releases on `host`
    pub fn new(settings: &'a Settings, host: &'a dyn ReleaseHost, runtime: &'a RuntimeConfig) -> Self {
        Self {
            settings,
            host,
            runtime,
        }
    }

    /// Assets of `output` in landing page order
    pub fn plan_assets(&self, tag: &str, output: &RenderOutput) -> Result<Vec<PlannedAsset>> {
        let languages = self.settings.documents.languages();
        output.ensure_complete(&languages)?;
        Ok(languages
            .iter()
            .filter_map(|language| output.get(language))
            .map(|artifact| {
                let language = artifact.language().to_string();
                PlannedAsset {
                    label: self
                        .settings
                        .documents
                        .entry(&language)
                        .map(|e| e.label.clone())
                        .unwrap_or_else(|| language.clone()),
                    name: self.settings.release.asset_name_for(&language, tag),
                    path: artifact.pdf.clone(),
                    sha256: artifact.record.sha256.clone(),
                    language,
                }
            })
            .collect())
    }

    /// Create the release for `request.tag` with every PDF of `output`.
    ///
    /// Fails without side effects when a release for the tag exists.
    pub async fn create(&self, request: &ReleaseRequest, output: &RenderOutput) -> Result<ReleaseRecord> {
        let tag = request.tag.trim();
        if tag.is_empty() {
            return Err(ReleaseRecordError::InvalidTag {
                tag: request.tag.clone(),
                reason: "tag is empty".to_string(),
            }
            .into());
        }

        let assets = self.plan_assets(tag, output)?;
        let retry = &self.runtime.retry;

        let existing = retry_with_backoff(
            || self.host.find_release(tag),
            retry.github_api,
            "Look up release",
            self.runtime,
            None,
        )
        .await?;
        if existing.is_some() {
            return Err(ReleaseRecordError::AlreadyExists {
                tag: tag.to_string(),
            }
            .into());
        }

        let new_release = NewRelease {
            tag: tag.to_string(),
            name: format!("CV {tag}"),
            body: notes::generate(request, &assets, output.build()),
            prerelease: request.prerelease,
            target_commitish: output.build().and_then(|b| b.commit.clone()),
        };

        // Not retried: a repeat after a lost response would report AlreadyExists
        let draft = self.host.create_release(&new_release).await?;
        self.runtime
            .verbose_println(&format!("Created draft release {} (id {})", tag, draft.id));

        for asset in &assets {
            let content = tokio::fs::read(&asset.path).await?;
            let uploaded = retry_with_backoff(
                || self.host.upload_asset(draft.id, &asset.name, content.clone()),
                retry.file_uploads,
                &format!("Upload {}", asset.name),
                self.runtime,
                None,
            )
            .await?;
            self.runtime
                .indent(&format!("Uploaded {} ({} bytes)", uploaded.name, uploaded.size));
        }

        let published = retry_with_backoff(
            || self.host.publish_release(draft.id),
            retry.github_api,
            "Publish release",
            self.runtime,
            None,
        )
        .await?;
        log::info!("Release {} published at {}", published.tag, published.html_url);
        Ok(published)
    }
}

/// Whether a version tag denotes a pre-release.
///
/// Versions with a pre-release component always do; `0.x` versions only
/// when `zero_is_prerelease` is set.
pub fn is_prerelease(version: &semver::Version, zero_is_prerelease: bool) -> bool {
    !version.pre.is_empty() || (zero_is_prerelease && version.major == 0)
}
