//! Project configuration loaded from `cv_release.toml`.
//!
//! Every field has a default so a repository with the conventional layout
//! (`cv/en.yaml`, `cv/pt.yaml`) only needs to name its languages.

use crate::error::{ConfigError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "cv_release.toml";

static LANGUAGE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2,3}(-[a-z]{2})?$").expect("language code regex is valid")
});

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where run state is persisted
    pub state_dir: PathBuf,
    /// Document descriptions
    pub documents: DocumentSettings,
    /// Renderer invocation
    pub render: RenderSettings,
    /// Static site publishing
    pub publish: PublishSettings,
    /// Release records
    pub release: ReleaseSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".cv_release"),
            documents: DocumentSettings::default(),
            render: RenderSettings::default(),
            publish: PublishSettings::default(),
            release: ReleaseSettings::default(),
        }
    }
}

/// One language variant of the CV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentEntry {
    /// Language code, also the published file stem (`<language>.pdf`)
    pub language: String,
    /// Human readable name shown on the landing page
    pub label: String,
    /// Path to the YAML description
    pub source: PathBuf,
}

/// Document description settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentSettings {
    /// Directory holding the descriptions; changes here trigger renders
    pub directory: PathBuf,
    /// Language listed first on the landing page
    pub default_language: String,
    /// Language variants
    pub entries: Vec<DocumentEntry>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("cv"),
            default_language: "en".to_string(),
            entries: vec![
                DocumentEntry {
                    language: "en".to_string(),
                    label: "English".to_string(),
                    source: PathBuf::from("cv/en.yaml"),
                },
                DocumentEntry {
                    language: "pt".to_string(),
                    label: "Português".to_string(),
                    source: PathBuf::from("cv/pt.yaml"),
                },
            ],
        }
    }
}

impl DocumentSettings {
    /// Find the entry for a language
    pub fn entry(&self, language: &str) -> Option<&DocumentEntry> {
        self.entries.iter().find(|e| e.language == language)
    }

    /// Language codes in landing page order (default language first)
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.entries.iter().map(|e| e.language.clone()).collect();
        if let Some(pos) = languages.iter().position(|l| *l == self.default_language) {
            let default = languages.remove(pos);
            languages.insert(0, default);
        }
        languages
    }
}

/// External renderer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    /// Renderer executable, resolved on PATH
    pub program: String,
    /// Subcommand placed before the source path
    pub subcommand: Option<String>,
    /// Directory receiving `<lang>.pdf` and `<lang>.build.json`
    pub output_dir: PathBuf,
    /// Kill the renderer after this many seconds; unset waits for it
    pub timeout_secs: Option<u64>,
    /// Flag followed by the destination PDF path
    pub pdf_path_flag: String,
    /// Flags suppressing auxiliary outputs (HTML, Markdown, PNG)
    pub suppress_flags: Vec<String>,
    /// Flags selecting validate-only mode
    pub validate_flags: Vec<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            program: "rendercv".to_string(),
            subcommand: Some("render".to_string()),
            output_dir: PathBuf::from("rendercv_output"),
            timeout_secs: None,
            pdf_path_flag: "--pdf-path".to_string(),
            suppress_flags: vec![
                "--dont-generate-html".to_string(),
                "--dont-generate-markdown".to_string(),
                "--dont-generate-png".to_string(),
            ],
            validate_flags: vec![
                "--dont-generate-pdf".to_string(),
                "--dont-generate-html".to_string(),
                "--dont-generate-markdown".to_string(),
                "--dont-generate-png".to_string(),
            ],
        }
    }
}

/// What happens when a deployment arrives while another is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyPolicy {
    /// Wait for the in-flight deployment to finish
    #[default]
    Queue,
    /// Abort the in-flight deployment at its next checkpoint
    Preempt,
}

/// How the site reaches its static host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum DeployMethod {
    /// Copy into a directory served by a web server
    Directory {
        /// Served directory
        path: PathBuf,
    },
    /// Force-push to a branch served by the forge (GitHub Pages)
    GitBranch {
        /// Remote to push to
        #[serde(default = "default_remote")]
        remote: String,
        /// Branch to publish
        #[serde(default = "default_pages_branch")]
        branch: String,
    },
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_pages_branch() -> String {
    "gh-pages".to_string()
}

impl Default for DeployMethod {
    fn default() -> Self {
        DeployMethod::GitBranch {
            remote: default_remote(),
            branch: default_pages_branch(),
        }
    }
}

/// Static site settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishSettings {
    /// Deployment target name; deployments with the same name are serialized
    pub target: String,
    /// Public URL of the site; derived from the repository for GitHub Pages
    pub base_url: Option<String>,
    /// Landing page title
    pub title: String,
    /// Redirect based on the browser's language preference
    pub auto_detect_language: bool,
    /// Policy for overlapping deployments
    pub concurrency: ConcurrencyPolicy,
    /// Where deployment locks live; defaults to `<state_dir>/locks`
    pub lock_dir: Option<PathBuf>,
    /// Publish on pushes that touch the documents, not only on tags
    pub on_push: bool,
    /// Deployment method
    pub deploy: DeployMethod,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            target: "github-pages".to_string(),
            base_url: None,
            title: "Curriculum Vitae".to_string(),
            auto_detect_language: false,
            concurrency: ConcurrencyPolicy::Queue,
            lock_dir: None,
            on_push: true,
            deploy: DeployMethod::default(),
        }
    }
}

impl PublishSettings {
    /// Configured base URL, or `fallback` when none is set; always ends in `/`
    pub fn base_url_or(&self, fallback: Option<String>) -> Option<String> {
        self.base_url
            .clone()
            .or(fallback)
            .map(|url| if url.ends_with('/') { url } else { format!("{url}/") })
    }
}

/// GitHub Pages URL of `owner/repo`.
///
/// User and organization sites (`owner/owner.github.io`) are served from the
/// root, project sites from `/<repo>/`.
pub fn github_pages_url(repository: &str) -> Option<String> {
    let (owner, name) = repository.split_once('/')?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    let host = format!("{}.github.io", owner.to_lowercase());
    if name.eq_ignore_ascii_case(&host) {
        Some(format!("https://{host}/"))
    } else {
        Some(format!("https://{host}/{name}/"))
    }
}

/// Release record settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSettings {
    /// `owner/repo`; falls back to `GITHUB_REPOSITORY`
    pub repository: Option<String>,
    /// Prefix of version tags
    pub tag_prefix: String,
    /// Asset file name; `{lang}` and `{tag}` are substituted
    pub asset_name: String,
    /// Treat `0.x` versions as pre-releases
    pub prerelease_for_zero_versions: bool,
    /// GitHub API root
    pub api_url: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            repository: None,
            tag_prefix: "v".to_string(),
            asset_name: "cv-{lang}-{tag}.pdf".to_string(),
            prerelease_for_zero_versions: false,
            api_url: "https://api.github.com".to_string(),
        }
    }
}

impl ReleaseSettings {
    /// Asset file name for a language and tag
    pub fn asset_name_for(&self, language: &str, tag: &str) -> String {
        self.asset_name
            .replace("{lang}", language)
            .replace("{tag}", tag)
    }
}

impl Settings {
    /// Load settings from a TOML file and validate them
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml(&content).map_err(|e| match e {
            ParseOrInvalid::Parse(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ParseOrInvalid::Invalid(err) => err,
        })?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from TOML text
    fn from_toml(content: &str) -> std::result::Result<Self, ParseOrInvalid> {
        let settings: Settings = toml::from_str(content).map_err(ParseOrInvalid::Parse)?;
        settings.validate().map_err(ParseOrInvalid::Invalid)?;
        Ok(settings)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.documents.entries.is_empty() {
            return invalid("documents.entries must list at least one language".to_string());
        }

        let mut seen = HashSet::new();
        for entry in &self.documents.entries {
            if !LANGUAGE_CODE_RE.is_match(&entry.language) {
                return invalid(format!(
                    "language code '{}' must look like 'en' or 'pt-br'",
                    entry.language
                ));
            }
            if !seen.insert(entry.language.as_str()) {
                return invalid(format!("language '{}' is listed twice", entry.language));
            }
        }

        if self.documents.entry(&self.documents.default_language).is_none() {
            return invalid(format!(
                "default_language '{}' has no entry",
                self.documents.default_language
            ));
        }

        if self.publish.target.trim().is_empty() {
            return invalid("publish.target must not be empty".to_string());
        }

        if !self.release.asset_name.contains("{lang}") {
            return invalid("release.asset_name must contain {lang}".to_string());
        }

        if let Some(repo) = &self.release.repository
            && repo.split('/').filter(|part| !part.is_empty()).count() != 2
        {
            return invalid(format!(
                "release.repository '{repo}' must have the form owner/repo"
            ));
        }

        Ok(())
    }

    /// Directory holding deployment locks
    pub fn lock_dir(&self) -> PathBuf {
        self.publish
            .lock_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("locks"))
    }

    /// Rebase relative paths onto `root` (the directory of the config file)
    pub fn rebase(mut self, root: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        };
        rebase(&mut self.state_dir);
        rebase(&mut self.documents.directory);
        for entry in &mut self.documents.entries {
            rebase(&mut entry.source);
        }
        rebase(&mut self.render.output_dir);
        if let Some(dir) = self.publish.lock_dir.as_mut() {
            rebase(dir);
        }
        if let DeployMethod::Directory { path } = &mut self.publish.deploy {
            rebase(path);
        }
        self
    }
}

enum ParseOrInvalid {
    Parse(toml::de::Error),
    Invalid(ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> std::result::Result<Settings, String> {
        Settings::from_toml(content).map_err(|e| match e {
            ParseOrInvalid::Parse(err) => err.to_string(),
            ParseOrInvalid::Invalid(err) => err.to_string(),
        })
    }

    #[test]
    fn defaults_cover_two_languages() {
        let settings = parse("").expect("empty config is valid");
        assert_eq!(settings.documents.languages(), vec!["en", "pt"]);
        assert!(!settings.publish.auto_detect_language);
        assert_eq!(settings.publish.concurrency, ConcurrencyPolicy::Queue);
    }

    #[test]
    fn parses_full_config() {
        let settings = parse(
            r#"
state_dir = ".state"

[documents]
directory = "content"
default_language = "pt"

[[documents.entries]]
language = "en"
label = "English"
source = "content/en.yaml"

[[documents.entries]]
language = "pt"
label = "Português"
source = "content/pt.yaml"

[render]
timeout_secs = 120

[publish]
base_url = "https://cv.example.org"
concurrency = "preempt"
auto_detect_language = true

[publish.deploy]
method = "directory"
path = "/srv/www/cv"

[release]
repository = "jane/cv"
"#,
        )
        .expect("config parses");

        assert_eq!(settings.documents.languages(), vec!["pt", "en"]);
        assert_eq!(settings.render.timeout_secs, Some(120));
        assert_eq!(settings.publish.concurrency, ConcurrencyPolicy::Preempt);
        assert_eq!(
            settings.publish.deploy,
            DeployMethod::Directory {
                path: PathBuf::from("/srv/www/cv")
            }
        );
        assert_eq!(
            settings.publish.base_url_or(None).as_deref(),
            Some("https://cv.example.org/")
        );
    }

    #[test]
    fn rejects_duplicate_languages() {
        let err = parse(
            r#"
[[documents.entries]]
language = "en"
label = "English"
source = "cv/en.yaml"

[[documents.entries]]
language = "en"
label = "English again"
source = "cv/en2.yaml"
"#,
        )
        .unwrap_err();
        assert!(err.contains("listed twice"), "{err}");
    }

    #[test]
    fn rejects_default_language_without_entry() {
        let err = parse("[documents]\ndefault_language = \"de\"\n").unwrap_err();
        assert!(err.contains("default_language 'de'"), "{err}");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse("[publish]\nautodetect = true\n").is_err());
    }

    #[test]
    fn derives_github_pages_url() {
        assert_eq!(
            github_pages_url("Jane/cv").as_deref(),
            Some("https://jane.github.io/cv/")
        );
        assert_eq!(
            github_pages_url("jane/jane.github.io").as_deref(),
            Some("https://jane.github.io/")
        );
        assert_eq!(github_pages_url("jane"), None);
    }

    #[test]
    fn explicit_base_url_wins_over_fallback() {
        let publish = PublishSettings {
            base_url: Some("https://cv.example.org".to_string()),
            ..PublishSettings::default()
        };
        assert_eq!(
            publish
                .base_url_or(Some("https://jane.github.io/cv/".to_string()))
                .as_deref(),
            Some("https://cv.example.org/")
        );
        assert_eq!(PublishSettings::default().base_url_or(None), None);
    }

    #[test]
    fn asset_names_substitute_language_and_tag() {
        let release = ReleaseSettings::default();
        assert_eq!(release.asset_name_for("pt", "v1.2.0"), "cv-pt-v1.2.0.pdf");
    }
}
