//! Triggers and the stages they run.

use crate::EnvConfig;
use crate::config::Settings;
use crate::error::{CliError, ReleaseRecordError, Result};
use crate::release::is_prerelease;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What started a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Trigger {
    /// Commits pushed to a branch
    Push {
        /// Pushed ref, e.g. `refs/heads/main`
        git_ref: Option<String>,
        /// Paths changed by the push; empty when unknown
        changed: Vec<PathBuf>,
    },
    /// Pull request opened or updated
    PullRequest {
        /// Paths changed by the pull request; empty when unknown
        changed: Vec<PathBuf>,
    },
    /// Tag pushed
    Tag {
        /// Tag name without `refs/tags/`
        tag: String,
    },
    /// Started by hand
    Manual {
        /// Release tag, if a release should be created
        tag: Option<String>,
        /// Force the pre-release flag
        prerelease: bool,
    },
}

/// Release part of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTarget {
    /// Tag to release
    pub tag: String,
    /// Mark as pre-release
    pub prerelease: bool,
}

/// Stages a trigger runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Render every language
    pub render: bool,
    /// Publish the site
    pub publish: bool,
    /// Create a release record
    pub release: Option<ReleaseTarget>,
    /// Why nothing runs, for skipped runs
    pub skipped: Option<String>,
}

impl RunPlan {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            render: false,
            publish: false,
            release: None,
            skipped: Some(reason.into()),
        }
    }

    /// True when no stage runs
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

impl Trigger {
    /// Trigger described by the GitHub Actions environment.
    ///
    /// Without `GITHUB_EVENT_NAME` the run counts as manual.
    pub fn from_env(env: &EnvConfig) -> Result<Self> {
        let git_ref = env.get("GITHUB_REF");
        let Some(event) = env.get("GITHUB_EVENT_NAME") else {
            return Ok(Trigger::Manual {
                tag: None,
                prerelease: false,
            });
        };

        match event.as_str() {
            "push" => match git_ref.as_deref().and_then(|r| r.strip_prefix("refs/tags/")) {
                Some(tag) => Ok(Trigger::Tag {
                    tag: tag.to_string(),
                }),
                None => Ok(Trigger::Push {
                    git_ref,
                    changed: Vec::new(),
                }),
            },
            "pull_request" | "pull_request_target" => Ok(Trigger::PullRequest {
                changed: Vec::new(),
            }),
            "workflow_dispatch" => Ok(Trigger::Manual {
                tag: git_ref
                    .as_deref()
                    .and_then(|r| r.strip_prefix("refs/tags/"))
                    .map(str::to_string),
                prerelease: false,
            }),
            other => Err(CliError::InvalidArguments {
                reason: format!("unsupported event '{other}'; pass --event explicitly"),
            }
            .into()),
        }
    }

    /// Short name for logs and state
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Push { .. } => "push",
            Trigger::PullRequest { .. } => "pull-request",
            Trigger::Tag { .. } => "tag",
            Trigger::Manual { .. } => "manual",
        }
    }

    /// Decide which stages run. Relative changed paths are taken relative
    /// to `repo_root`.
    pub fn plan(&self, settings: &Settings, repo_root: &Path) -> Result<RunPlan> {
        let plan = match self {
            Trigger::Push { changed, .. } => {
                if !touches_documents(changed, settings, repo_root) {
                    return Ok(RunPlan::skip("no document description changed"));
                }
                RunPlan {
                    render: true,
                    publish: settings.publish.on_push,
                    release: None,
                    skipped: None,
                }
            }
            Trigger::PullRequest { changed } => {
                if !touches_documents(changed, settings, repo_root) {
                    return Ok(RunPlan::skip("no document description changed"));
                }
                RunPlan {
                    render: true,
                    publish: false,
                    release: None,
                    skipped: None,
                }
            }
            Trigger::Tag { tag } => {
                let Some(version) = parse_version_tag(tag, &settings.release.tag_prefix) else {
                    return Ok(RunPlan::skip(format!("tag '{tag}' is not a version tag")));
                };
                RunPlan {
                    render: true,
                    publish: true,
                    release: Some(ReleaseTarget {
                        tag: tag.clone(),
                        prerelease: is_prerelease(
                            &version,
                            settings.release.prerelease_for_zero_versions,
                        ),
                    }),
                    skipped: None,
                }
            }
            Trigger::Manual { tag, prerelease } => {
                let release = match tag {
                    Some(tag) => {
                        let version = parse_version_tag(tag, &settings.release.tag_prefix)
                            .ok_or_else(|| ReleaseRecordError::InvalidTag {
                                tag: tag.clone(),
                                reason: format!(
                                    "expected {}MAJOR.MINOR.PATCH[-PRERELEASE]",
                                    settings.release.tag_prefix
                                ),
                            })?;
                        Some(ReleaseTarget {
                            tag: tag.clone(),
                            prerelease: *prerelease
                                || is_prerelease(
                                    &version,
                                    settings.release.prerelease_for_zero_versions,
                                ),
                        })
                    }
                    None => None,
                };
                RunPlan {
                    render: true,
                    publish: true,
                    release,
                    skipped: None,
                }
            }
        };
        Ok(plan)
    }
}

/// Semantic version carried by a tag such as `v1.2.0` or `v2.0.0-rc.1`
pub fn parse_version_tag(tag: &str, prefix: &str) -> Option<semver::Version> {
    let version = tag.strip_prefix(prefix)?;
    semver::Version::parse(version).ok()
}

/// An empty change list means the changes are unknown and counts as a hit
fn touches_documents(changed: &[PathBuf], settings: &Settings, repo_root: &Path) -> bool {
    if changed.is_empty() {
        return true;
    }
    changed.iter().any(|path| {
        let path = if path.is_relative() {
            repo_root.join(path)
        } else {
            path.clone()
        };
        path.starts_with(&settings.documents.directory)
            || settings.documents.entries.iter().any(|e| e.source == path)
    })
}
