//! Renderer backed by an external command-line tool (rendercv by default).

use super::Renderer;
use crate::config::RenderSettings;
use crate::document::DocumentDescription;
use crate::error::{RenderError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Stderr kept in error messages
const STDERR_TAIL_BYTES: usize = 4000;

/// Runs the configured renderer executable
#[derive(Debug, Clone)]
pub struct ExternalRenderer {
    settings: RenderSettings,
    program: PathBuf,
}

enum Mode<'a> {
    Render { pdf_path: &'a Path },
    Validate,
}

impl ExternalRenderer {
    /// Resolve the renderer on PATH
    pub fn new(settings: RenderSettings) -> Result<Self> {
        let program = which::which(&settings.program).map_err(|_| RenderError::RendererNotFound {
            program: settings.program.clone(),
        })?;
        log::debug!("Using renderer {}", program.display());
        Ok(Self { settings, program })
    }

    /// Resolved executable
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn arguments(&self, source: &Path, mode: &Mode<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(subcommand) = &self.settings.subcommand {
            args.push(subcommand.into());
        }
        args.push(source.into());
        match mode {
            Mode::Render { pdf_path } => {
                args.push((&self.settings.pdf_path_flag).into());
                args.push(pdf_path.into());
                args.extend(self.settings.suppress_flags.iter().map(OsString::from));
            }
            Mode::Validate => {
                args.extend(self.settings.validate_flags.iter().map(OsString::from));
            }
        }
        args
    }

    async fn run(
        &self,
        document: &DocumentDescription,
        pdf_path: Option<&Path>,
        scratch: &Path,
    ) -> Result<()> {
        // The tool runs inside the scratch directory, so paths must be absolute.
        let source = std::fs::canonicalize(&document.source)?;
        let pdf_path = match pdf_path {
            Some(path) if path.is_relative() => Some(std::env::current_dir()?.join(path)),
            other => other.map(Path::to_path_buf),
        };
        let mode = match &pdf_path {
            Some(pdf_path) => Mode::Render { pdf_path },
            None => Mode::Validate,
        };

        let args = self.arguments(&source, &mode);
        log::debug!("{} {:?}", self.program.display(), args);

        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.settings.timeout_secs {
            Some(seconds) => {
                match tokio::time::timeout(Duration::from_secs(seconds), child.wait_with_output())
                    .await
                {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(RenderError::Timeout {
                            language: document.language.clone(),
                            seconds,
                        }
                        .into());
                    }
                }
            }
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(RenderError::RendererFailed {
                language: document.language.clone(),
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr)),
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            log::debug!("[{}] {}", document.language, line);
        }
        Ok(())
    }
}

fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[async_trait]
impl Renderer for ExternalRenderer {
    async fn render(
        &self,
        document: &DocumentDescription,
        pdf_path: &Path,
        scratch: &Path,
    ) -> Result<()> {
        self.run(document, Some(pdf_path), scratch).await
    }

    async fn validate(&self, document: &DocumentDescription, scratch: &Path) -> Result<()> {
        self.run(document, None, scratch).await
    }
}
