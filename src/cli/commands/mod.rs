//! Command execution.
//!
//! Each command loads the settings, builds a [`Pipeline`] and reports what
//! happened. Errors are printed here, with recovery suggestions, and mapped
//! to exit codes.

mod publish;
mod release;
mod render;
mod run;
mod status;
mod validate;

use crate::EnvConfig;
use crate::cli::{Args, Command, OutputManager, RuntimeConfig};
use crate::config::{DEFAULT_CONFIG_FILE, Settings};
use crate::error::{ConfigError, ErrorClass, Result};
use crate::pipeline::Pipeline;
use crate::render::RenderOutput;
use std::path::{Path, PathBuf};

use publish::execute_publish;
use release::execute_release;
use render::execute_render;
use run::execute_run;
use status::execute_status;
use validate::execute_validate;

/// Settings plus the environment a command runs in
pub(crate) struct CommandContext {
    pub(crate) settings: Settings,
    pub(crate) env: EnvConfig,
    pub(crate) repo_root: PathBuf,
}

impl CommandContext {
    pub(crate) fn pipeline<'a>(&'a self, config: &'a RuntimeConfig) -> Pipeline<'a> {
        Pipeline::new(&self.settings, config, self.env.clone(), &self.repo_root)
    }
}

/// Execute the parsed command and return the process exit code
pub async fn execute_command(args: Args) -> Result<i32> {
    if let Err(validation_error) = args.validate() {
        let output = OutputManager::new(false, false);
        output.error(&format!("Invalid arguments: {}", validation_error));
        return Ok(1);
    }

    let env = EnvConfig::from_env();
    let config = RuntimeConfig::from_args(&args, &env);

    let result = match load_context(args.config.as_deref(), env) {
        Ok(context) => dispatch(&args, &config, &context).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) if e.class() == ErrorClass::Superseded => {
            config.warning_println(&e.to_string());
            Ok(2)
        }
        Err(e) => {
            config.error_println(&format!(
                "Command '{}' failed: {}",
                args.command.name(),
                e
            ));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() && !config.is_quiet() {
                config.println("\nRecovery suggestions:");
                for suggestion in suggestions {
                    config.indent(&format!("• {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}

async fn dispatch(args: &Args, config: &RuntimeConfig, context: &CommandContext) -> Result<i32> {
    match &args.command {
        Command::Validate {
            lang,
            structure_only,
        } => execute_validate(lang.as_deref(), *structure_only, config, context).await,
        Command::Render { lang } => execute_render(lang.as_deref(), config, context).await,
        Command::Publish { from_existing } => execute_publish(*from_existing, config, context).await,
        Command::Release { .. } => execute_release(&args.command, config, context).await,
        Command::Run { .. } => execute_run(&args.command, config, context).await,
        Command::Status { json } => execute_status(*json, config, context),
    }
}

/// Load settings and rebase them onto the directory holding the config.
///
/// Without `--config`, a missing `cv_release.toml` means all defaults
/// relative to the working directory.
fn load_context(config_path: Option<&Path>, env: EnvConfig) -> Result<CommandContext> {
    let (settings, root) = match config_path {
        Some(path) => (Settings::load(path)?, config_root(path)?),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                (Settings::load(path)?, config_root(path)?)
            } else {
                log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                let settings = Settings::default();
                settings.validate()?;
                (settings, std::path::absolute(".")?)
            }
        }
    };

    Ok(CommandContext {
        settings: settings.rebase(&root),
        env,
        repo_root: root,
    })
}

fn config_root(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(std::path::absolute(parent)?)
}

/// Artifacts to publish or release: rendered now, or left by an earlier render
async fn artifacts(
    from_existing: bool,
    config: &RuntimeConfig,
    pipeline: &Pipeline<'_>,
) -> Result<RenderOutput> {
    if from_existing {
        config.verbose_println("Using artifacts from the last render");
        pipeline.existing_output()
    } else {
        config.section("Render");
        pipeline.render(None).await
    }
}
