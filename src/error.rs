//! Error types for cv_release operations.
//!
//! Every stage has its own error enum with actionable messages. They are
//! wrapped by [`PipelineError`], which also knows how to classify a failure
//! and which failures are worth retrying.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cv_release operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for all cv_release operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Document description errors
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Render stage errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Publish stage errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Release stage errors
    #[error("Release error: {0}")]
    Release(#[from] ReleaseRecordError),

    /// GitHub API errors
    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),

    /// State management errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file missing
    #[error("Config file not found at {path}")]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// Config file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// TOML parse error
        #[source]
        source: toml::de::Error,
    },

    /// Config parsed but is inconsistent
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Reason for the error
        reason: String,
    },
}

/// One structural problem found in a document description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending node, e.g. `design.colors.name`
    pub path: String,
    /// What is wrong with it
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Document description errors
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Description file missing
    #[error("Document description not found at {path}")]
    NotFound {
        /// Expected location
        path: PathBuf,
    },

    /// Not valid YAML
    #[error("Failed to parse {path}: {reason}")]
    Parse {
        /// Description file path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Valid YAML that fails structural validation
    #[error("{path} failed validation with {} issue(s): {}", .issues.len(), format_issues(.issues))]
    Invalid {
        /// Description file path
        path: PathBuf,
        /// Every issue found
        issues: Vec<ValidationIssue>,
    },

    /// Language requested that has no description
    #[error("No document description configured for language '{language}'")]
    UnknownLanguage {
        /// Requested language code
        language: String,
    },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Render stage errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer executable not on PATH
    #[error("Renderer '{program}' not found on PATH")]
    RendererNotFound {
        /// Program name
        program: String,
    },

    /// Renderer exited unsuccessfully
    #[error("Renderer failed for '{language}' (exit code {code:?}): {stderr}")]
    RendererFailed {
        /// Language being rendered
        language: String,
        /// Process exit code, if any
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Renderer exceeded the configured timeout
    #[error("Renderer timed out after {seconds}s for '{language}'")]
    Timeout {
        /// Language being rendered
        language: String,
        /// Configured timeout
        seconds: u64,
    },

    /// Expected PDF absent
    #[error("Expected artifact missing: {path}")]
    MissingArtifact {
        /// Path where the artifact should be
        path: PathBuf,
    },

    /// Artifacts on disk come from different render invocations
    #[error("Artifacts for '{language}' and '{other}' come from different renders")]
    MixedRenders {
        /// Language whose artifact disagrees
        language: String,
        /// Language it was compared against
        other: String,
    },

    /// File present but not a PDF
    #[error("Artifact at {path} is not a PDF")]
    InvalidArtifact {
        /// Offending file
        path: PathBuf,
    },
}

/// Publish stage errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Landing page template failed
    #[error("Failed to render landing page: {reason}")]
    Template {
        /// Template engine message
        reason: String,
    },

    /// Deployment lock could not be taken
    #[error("Failed to lock deployment target '{target}': {reason}")]
    Lock {
        /// Deployment target name
        target: String,
        /// Reason for the error
        reason: String,
    },

    /// A newer deployment to the same target took over
    #[error("Deployment to '{target}' superseded by a newer request (ticket {ticket} < {latest})")]
    Superseded {
        /// Deployment target name
        target: String,
        /// Ticket held by this deployment
        ticket: u64,
        /// Newest ticket issued
        latest: u64,
    },

    /// Deployer failed
    #[error("Deployment to '{target}' failed: {reason}")]
    DeployFailed {
        /// Deployment target name
        target: String,
        /// Reason for the error
        reason: String,
    },

    /// No base URL could be determined
    #[error("No base URL configured for target '{target}'")]
    MissingBaseUrl {
        /// Deployment target name
        target: String,
    },
}

/// Release record errors
#[derive(Error, Debug)]
pub enum ReleaseRecordError {
    /// A release for the tag already exists
    #[error("A release for tag '{tag}' already exists; refusing to overwrite it")]
    AlreadyExists {
        /// Tag name
        tag: String,
    },

    /// Tag is not a version tag
    #[error("Tag '{tag}' is not a version tag: {reason}")]
    InvalidTag {
        /// Tag name
        tag: String,
        /// Reason for the error
        reason: String,
    },

    /// No release repository configured or detectable
    #[error("No release repository configured. Set release.repository or GITHUB_REPOSITORY")]
    MissingRepository,
}

/// GitHub API errors
#[derive(Error, Debug)]
pub enum GitHubError {
    /// No token available
    #[error("GitHub token not provided. Set GH_TOKEN or GITHUB_TOKEN")]
    MissingToken,

    /// Token rejected
    #[error("GitHub authentication failed: {0}")]
    AuthFailed(String),

    /// Rate limit exceeded
    #[error("GitHub rate limit exceeded")]
    RateLimited,

    /// API returned an error
    #[error("GitHub API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),
}

/// State management errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file corrupted
    #[error("State file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },

    /// State file not found
    #[error("State file not found. No run recorded yet.")]
    NotFound,

    /// State version mismatch
    #[error("State file version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Found version
        found: String,
    },

    /// Failed to save state
    #[error("Failed to save state: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// Failure classes reported to the triggering actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed description or configuration
    InputValidation,
    /// Expected artifact absent after a stage
    MissingArtifact,
    /// Deployment lost to a newer request
    Superseded,
    /// Release tag already taken
    DuplicateRelease,
    /// Network, rate limit or server side failure
    Transient,
    /// Anything else
    Other,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorClass::InputValidation => "input validation",
            ErrorClass::MissingArtifact => "missing artifact",
            ErrorClass::Superseded => "superseded",
            ErrorClass::DuplicateRelease => "duplicate release",
            ErrorClass::Transient => "transient",
            ErrorClass::Other => "unclassified",
        })
    }
}

impl PipelineError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Config(_)
            | PipelineError::Document(_)
            | PipelineError::Release(ReleaseRecordError::InvalidTag { .. }) => {
                ErrorClass::InputValidation
            }
            PipelineError::Render(RenderError::MissingArtifact { .. })
            | PipelineError::Render(RenderError::MixedRenders { .. })
            | PipelineError::Render(RenderError::InvalidArtifact { .. }) => {
                ErrorClass::MissingArtifact
            }
            PipelineError::Publish(PublishError::Superseded { .. }) => ErrorClass::Superseded,
            PipelineError::Release(ReleaseRecordError::AlreadyExists { .. }) => {
                ErrorClass::DuplicateRelease
            }
            PipelineError::GitHub(GitHubError::Network(_))
            | PipelineError::GitHub(GitHubError::RateLimited) => ErrorClass::Transient,
            PipelineError::GitHub(GitHubError::Api { status, .. }) if *status >= 500 => {
                ErrorClass::Transient
            }
            _ => ErrorClass::Other,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PipelineError::Config(ConfigError::NotFound { path }) => vec![
                format!("Create {} or pass --config <path>", path.display()),
                "Run from the repository root that holds the document descriptions".to_string(),
            ],
            PipelineError::Document(DocumentError::Invalid { path, .. }) => vec![
                format!("Fix the issues listed above in {}", path.display()),
                "Re-run `cv_release validate` until it passes".to_string(),
            ],
            PipelineError::Render(RenderError::RendererNotFound { program }) => vec![
                format!("Install the renderer: pip install \"{program}[full]\""),
                "Or point render.program at the executable in cv_release.toml".to_string(),
            ],
            PipelineError::Render(RenderError::MissingArtifact { .. })
            | PipelineError::Render(RenderError::MixedRenders { .. }) => vec![
                "Run `cv_release render` before publishing or releasing".to_string(),
            ],
            PipelineError::Release(ReleaseRecordError::AlreadyExists { tag }) => vec![
                format!("Delete the existing release for {tag} manually if it is wrong"),
                "Or tag a new version".to_string(),
            ],
            PipelineError::GitHub(GitHubError::MissingToken)
            | PipelineError::GitHub(GitHubError::AuthFailed(_)) => vec![
                "Export GH_TOKEN or GITHUB_TOKEN with contents:write permission".to_string(),
            ],
            PipelineError::GitHub(GitHubError::RateLimited) => vec![
                "Wait for the rate limit window to reset and run again".to_string(),
            ],
            PipelineError::Publish(PublishError::Superseded { .. }) => vec![
                "A newer deployment is running; nothing to do".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if retrying the failed operation can help
    pub fn is_recoverable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
