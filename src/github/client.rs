//! GitHub REST implementation of [`ReleaseHost`].

use crate::EnvConfig;
use crate::error::{GitHubError, PipelineError, ReleaseRecordError, Result};
use crate::release::{NewRelease, ReleaseAsset, ReleaseHost, ReleaseRecord};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const USER_AGENT_VALUE: &str = concat!("cv_release/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";
const RELEASES_PER_PAGE: u32 = 100;

/// Release host backed by the GitHub REST API
pub struct GitHubReleaseHost {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
}

impl std::fmt::Debug for GitHubReleaseHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubReleaseHost")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiRelease {
    id: u64,
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    prerelease: bool,
    draft: bool,
    html_url: String,
    upload_url: String,
    #[serde(default)]
    assets: Vec<ApiAsset>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    name: String,
    browser_download_url: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: String,
}

impl From<ApiAsset> for ReleaseAsset {
    fn from(asset: ApiAsset) -> Self {
        ReleaseAsset {
            name: asset.name,
            download_url: asset.browser_download_url,
            size: asset.size,
        }
    }
}

impl From<ApiRelease> for ReleaseRecord {
    fn from(release: ApiRelease) -> Self {
        ReleaseRecord {
            id: release.id,
            name: release.name.unwrap_or_else(|| release.tag_name.clone()),
            tag: release.tag_name,
            body: release.body.unwrap_or_default(),
            prerelease: release.prerelease,
            draft: release.draft,
            html_url: release.html_url,
            assets: release.assets.into_iter().map(ReleaseAsset::from).collect(),
        }
    }
}

impl GitHubReleaseHost {
    /// Host for `repository` (`owner/repo`) authenticated with `token`
    pub fn new(token: impl Into<String>, repository: &str, api_base: &str) -> Result<Self> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
            .ok_or(ReleaseRecordError::MissingRepository)?;
        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| GitHubError::Network(e.to_string()))?;
        Ok(Self {
            client,
            token: token.into(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Host using `GH_TOKEN` or `GITHUB_TOKEN`
    pub fn from_env(env: &EnvConfig, repository: &str, api_base: &str) -> Result<Self> {
        let token = env
            .first_of(&["GH_TOKEN", "GITHUB_TOKEN"])
            .ok_or(GitHubError::MissingToken)?;
        Self::new(token, repository, api_base)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| GitHubError::AuthFailed("token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, self.owner, self.repo, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| GitHubError::Network(e.to_string()).into())
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }
        response.json().await.map_err(|e| {
            GitHubError::Api {
                status: status.as_u16(),
                message: format!("failed to parse response: {e}"),
            }
            .into()
        })
    }

    async fn error_from(response: Response) -> PipelineError {
        let status = response.status();
        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");
        let body = response.text().await.unwrap_or_default();
        map_error(status, rate_limited, &body)
    }

    async fn release_by_id(&self, release_id: u64) -> Result<ApiRelease> {
        let url = self.repo_url(&format!("releases/{release_id}"));
        let response = self.send(self.client.get(url)).await?;
        Self::parse(response).await
    }

    /// Drafts are invisible to the by-tag endpoint; look through the list
    async fn find_draft(&self, tag: &str) -> Result<Option<ApiRelease>> {
        let mut page = 1u32;
        loop {
            let url = self.repo_url("releases");
            let request = self.client.get(url).query(&[
                ("per_page", RELEASES_PER_PAGE),
                ("page", page),
            ]);
            let releases: Vec<ApiRelease> = Self::parse(self.send(request).await?).await?;
            let count = releases.len();
            if let Some(found) = releases.into_iter().find(|r| r.tag_name == tag) {
                return Ok(Some(found));
            }
            if count < RELEASES_PER_PAGE as usize {
                return Ok(None);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl ReleaseHost for GitHubReleaseHost {
    async fn find_release(&self, tag: &str) -> Result<Option<ReleaseRecord>> {
        let url = self.repo_url(&format!("releases/tags/{tag}"));
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(self.find_draft(tag).await?.map(ReleaseRecord::from));
        }
        let release: ApiRelease = Self::parse(response).await?;
        Ok(Some(release.into()))
    }

    async fn create_release(&self, release: &NewRelease) -> Result<ReleaseRecord> {
        let mut payload = serde_json::json!({
            "tag_name": release.tag,
            "name": release.name,
            "body": release.body,
            "draft": true,
            "prerelease": release.prerelease,
        });
        if let Some(commitish) = &release.target_commitish {
            payload["target_commitish"] = serde_json::Value::String(commitish.clone());
        }

        let response = self
            .send(self.client.post(self.repo_url("releases")).json(&payload))
            .await?;
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            if is_already_exists(&body) {
                return Err(ReleaseRecordError::AlreadyExists {
                    tag: release.tag.clone(),
                }
                .into());
            }
            return Err(map_error(StatusCode::UNPROCESSABLE_ENTITY, false, &body));
        }
        let created: ApiRelease = Self::parse(response).await?;
        log::debug!("Created draft release {} for {}", created.id, created.tag_name);
        Ok(created.into())
    }

    async fn upload_asset(&self, release_id: u64, name: &str, content: Vec<u8>) -> Result<ReleaseAsset> {
        let release = self.release_by_id(release_id).await?;
        let url = upload_endpoint(&release.upload_url, name)?;
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/pdf")
            .body(content);
        let response = self.send(request).await?;
        let asset: ApiAsset = Self::parse(response).await?;
        Ok(asset.into())
    }

    async fn publish_release(&self, release_id: u64) -> Result<ReleaseRecord> {
        let url = self.repo_url(&format!("releases/{release_id}"));
        let request = self
            .client
            .patch(url)
            .json(&serde_json::json!({ "draft": false }));
        let release: ApiRelease = Self::parse(self.send(request).await?).await?;
        Ok(release.into())
    }
}

/// Upload URL for an asset, from the release's URI template
fn upload_endpoint(upload_url: &str, name: &str) -> Result<url::Url> {
    let base = upload_url
        .split_once('{')
        .map_or(upload_url, |(base, _)| base);
    let mut url = url::Url::parse(base).map_err(|e| GitHubError::Api {
        status: 0,
        message: format!("invalid upload URL '{upload_url}': {e}"),
    })?;
    url.query_pairs_mut().append_pair("name", name);
    Ok(url)
}

fn is_already_exists(body: &str) -> bool {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.errors.iter().any(|d| d.code == "already_exists"))
        .unwrap_or(false)
}

/// Error for a non-success response
fn map_error(status: StatusCode, rate_limited: bool, body: &str) -> PipelineError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    let error = match status {
        StatusCode::UNAUTHORIZED => GitHubError::AuthFailed("invalid or expired token".to_string()),
        StatusCode::TOO_MANY_REQUESTS => GitHubError::RateLimited,
        StatusCode::FORBIDDEN if rate_limited => GitHubError::RateLimited,
        StatusCode::FORBIDDEN => GitHubError::AuthFailed(format!("permission denied: {message}")),
        _ => GitHubError::Api {
            status: status.as_u16(),
            message,
        },
    };
    error.into()
}
