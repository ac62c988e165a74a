//! In-memory [`ReleaseHost`] for dry runs and tests.

use crate::error::{GitHubError, ReleaseRecordError, Result};
use crate::release::{NewRelease, ReleaseAsset, ReleaseHost, ReleaseRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Release host keeping everything in memory.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryReleaseHost {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    releases: Vec<ReleaseRecord>,
    contents: HashMap<(u64, String), Vec<u8>>,
    next_id: u64,
    failing_uploads: u32,
}

impl MemoryReleaseHost {
    /// Empty host
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that already has `record`
    pub fn with_release(self, record: ReleaseRecord) -> Self {
        {
            let mut inner = self.lock();
            inner.next_id = inner.next_id.max(record.id);
            inner.releases.push(record);
        }
        self
    }

    /// Make the next `count` uploads fail with a network error
    pub fn fail_next_uploads(&self, count: u32) {
        self.lock().failing_uploads = count;
    }

    /// Every release, in creation order
    pub fn releases(&self) -> Vec<ReleaseRecord> {
        self.lock().releases.clone()
    }

    /// Bytes of an uploaded asset
    pub fn asset_content(&self, tag: &str, name: &str) -> Option<Vec<u8>> {
        let inner = self.lock();
        let id = inner.releases.iter().find(|r| r.tag == tag)?.id;
        inner.contents.get(&(id, name.to_string())).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(release_id: u64) -> GitHubError {
    GitHubError::Api {
        status: 404,
        message: format!("release {release_id} not found"),
    }
}

#[async_trait]
impl ReleaseHost for MemoryReleaseHost {
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>> {
        Ok(self.lock().releases.iter().find(|r| r.tag == tag).cloned())
    }

    async fn create_release(&self, release: &NewRelease) -> Result<ReleaseRecord> {
        let mut inner = self.lock();
        if inner.releases.iter().any(|r| r.tag == release.tag) {
            return Err(ReleaseRecordError::AlreadyExists {
                tag: release.tag.clone(),
            }
            .into());
        }
        inner.next_id += 1;
        let record = ReleaseRecord {
            id: inner.next_id,
            tag: release.tag.clone(),
            name: release.name.clone(),
            body: release.body.clone(),
            prerelease: release.prerelease,
            draft: true,
            html_url: format!("memory://releases/{}", release.tag),
            assets: Vec::new(),
        };
        inner.releases.push(record.clone());
        Ok(record)
    }

    async fn upload_asset(&self, release_id: u64, name: &str, content: Vec<u8>) -> Result<ReleaseAsset> {
        let mut inner = self.lock();
        if inner.failing_uploads > 0 {
            inner.failing_uploads -= 1;
            return Err(GitHubError::Network("connection reset".to_string()).into());
        }
        let release = inner
            .releases
            .iter_mut()
            .find(|r| r.id == release_id)
            .ok_or_else(|| not_found(release_id))?;
        if release.assets.iter().any(|a| a.name == name) {
            return Err(GitHubError::Api {
                status: 422,
                message: format!("asset {name} already exists"),
            }
            .into());
        }
        let asset = ReleaseAsset {
            name: name.to_string(),
            download_url: format!("memory://releases/{}/{}", release.tag, name),
            size: content.len() as u64,
        };
        release.assets.push(asset.clone());
        inner.contents.insert((release_id, name.to_string()), content);
        Ok(asset)
    }

    async fn publish_release(&self, release_id: u64) -> Result<ReleaseRecord> {
        let mut inner = self.lock();
        let release = inner
            .releases
            .iter_mut()
            .find(|r| r.id == release_id)
            .ok_or_else(|| not_found(release_id))?;
        release.draft = false;
        Ok(release.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_release(tag: &str) -> NewRelease {
        NewRelease {
            tag: tag.to_string(),
            name: format!("CV {tag}"),
            body: String::new(),
            prerelease: false,
            target_commitish: None,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_tags() {
        let host = MemoryReleaseHost::new();
        host.create_release(&new_release("v1.0.0")).await.unwrap();
        let err = host.create_release(&new_release("v1.0.0")).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let host = MemoryReleaseHost::new();
        let view = host.clone();
        let draft = host.create_release(&new_release("v1.0.0")).await.unwrap();
        host.upload_asset(draft.id, "cv-en.pdf", b"%PDF".to_vec())
            .await
            .unwrap();

        assert_eq!(view.asset_content("v1.0.0", "cv-en.pdf").unwrap(), b"%PDF");
        assert!(view.releases()[0].draft);
        host.publish_release(draft.id).await.unwrap();
        assert!(!view.releases()[0].draft);
    }

    #[tokio::test]
    async fn scripted_upload_failures_are_transient() {
        let host = MemoryReleaseHost::new();
        let draft = host.create_release(&new_release("v1.0.0")).await.unwrap();
        host.fail_next_uploads(1);

        let err = host.upload_asset(draft.id, "a.pdf", vec![1]).await.unwrap_err();
        assert!(err.is_recoverable());
        host.upload_asset(draft.id, "a.pdf", vec![1]).await.unwrap();
    }
}
