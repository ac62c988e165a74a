//! Command line argument parsing and validation.

use super::{OutputManager, RetryConfig};
use crate::EnvConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Render, publish and release a multi-language CV
#[derive(Parser, Debug)]
#[command(
    name = "cv_release",
    version,
    about = "Render, publish and release a multi-language CV",
    long_about = "Render every language variant of a CV to PDF, publish the PDFs behind a
language-selection page, and attach them to a tagged release.

Usage:
  cv_release validate
  cv_release render --lang pt
  cv_release run --event tag --tag v1.2.0
  cv_release status --json"
)]
pub struct Args {
    /// Configuration file [default: cv_release.toml if present]
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Build and lock, but do not deploy or create a real release
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Show detailed progress
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check document descriptions without producing artifacts
    Validate {
        /// Only this language
        #[arg(long, value_name = "CODE")]
        lang: Option<String>,

        /// Skip the renderer's validate-only mode
        #[arg(long)]
        structure_only: bool,
    },

    /// Render PDFs
    Render {
        /// Only this language
        #[arg(long, value_name = "CODE")]
        lang: Option<String>,
    },

    /// Publish the static site
    Publish {
        /// Use artifacts from an earlier render instead of rendering
        #[arg(long)]
        from_existing: bool,
    },

    /// Create a release record with the PDFs attached
    Release {
        /// Version tag, e.g. v1.2.0
        #[arg(long)]
        tag: String,

        /// Mark the release as a pre-release
        #[arg(long)]
        prerelease: bool,

        /// Published site URL to link from the notes
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Use artifacts from an earlier render instead of rendering
        #[arg(long)]
        from_existing: bool,
    },

    /// Run the stages a trigger calls for
    Run {
        /// Event kind; read from GITHUB_EVENT_NAME when omitted
        #[arg(long, value_enum)]
        event: Option<Event>,

        /// Git ref of the event, e.g. refs/tags/v1.2.0
        #[arg(long = "ref", value_name = "REF")]
        git_ref: Option<String>,

        /// Path changed by a push or pull request (repeatable)
        #[arg(long = "changed", value_name = "PATH")]
        changed: Vec<PathBuf>,

        /// Tag for tag and manual events
        #[arg(long)]
        tag: Option<String>,

        /// Force the pre-release flag on manual runs
        #[arg(long)]
        prerelease: bool,
    },

    /// Show the last orchestrated run
    Status {
        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Trigger kinds accepted by `run --event`
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Push to a branch
    Push,
    /// Pull request
    PullRequest,
    /// Version tag
    Tag,
    /// Manual run
    Manual,
}

impl Command {
    /// Subcommand name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Validate { .. } => "validate",
            Command::Render { .. } => "render",
            Command::Publish { .. } => "publish",
            Command::Release { .. } => "release",
            Command::Run { .. } => "run",
            Command::Status { .. } => "status",
        }
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Release { tag, .. } if tag.trim().is_empty() => {
                Err("--tag must not be empty".to_string())
            }
            Command::Run {
                event: Some(Event::Tag),
                tag: None,
                git_ref,
                ..
            } if !git_ref
                .as_deref()
                .is_some_and(|r| r.starts_with("refs/tags/")) =>
            {
                Err("--event tag needs --tag or --ref refs/tags/<tag>".to_string())
            }
            Command::Run {
                event: Some(Event::Tag | Event::PullRequest),
                prerelease: true,
                ..
            } => Err("--prerelease only applies to manual runs".to_string()),
            _ => Ok(()),
        }
    }
}

/// Settings derived from the command line and environment for one invocation
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: OutputManager,
    /// Retry limits
    pub retry: RetryConfig,
    dry_run: bool,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool, dry_run: bool, retry: RetryConfig) -> Self {
        Self {
            output: OutputManager::new(verbose, quiet),
            retry,
            dry_run,
        }
    }

    /// Silent configuration with default retries
    pub fn quiet() -> Self {
        Self::new(false, true, false, RetryConfig::default())
    }

    /// Configuration for parsed arguments
    pub fn from_args(args: &Args, env: &EnvConfig) -> Self {
        Self::new(
            args.verbose,
            args.quiet,
            args.dry_run,
            RetryConfig::from_env(env),
        )
    }

    /// Same configuration with dry run switched on or off
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    /// Whether side effects on hosts are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Check if verbose output is enabled
    pub fn is_verbose(&self) -> bool {
        self.output.is_verbose()
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print message in verbose mode only
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(false, false, false, RetryConfig::default())
    }
}
