//! Orchestration of the render, publish and release stages.
//!
//! A run goes through two states, rendering-and-publishing then releasing,
//! and stops at the first failure without rolling anything back. Publish's
//! base URL is handed to Release unchanged.

mod retry;

pub use retry::retry_with_backoff;

use crate::EnvConfig;
use crate::cli::RuntimeConfig;
use crate::config::Settings;
use crate::document::{self, ColorRole, DocumentDescription};
use crate::error::{ErrorClass, ReleaseRecordError, Result};
use crate::github::{self, GitHubReleaseHost, MemoryReleaseHost};
use crate::metadata::BuildMetadata;
use crate::publish::{Deployer, DeploymentGate, PublishResult, Publisher};
use crate::release::{ReleaseHost, ReleaseManager, ReleaseRecord, ReleaseRequest};
use crate::render::{ExternalRenderer, RenderOutput, RenderStage, Renderer};
use crate::state::{RunPhase, RunState, StateManager};
use crate::trigger::{RunPlan, Trigger};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    /// Every planned stage finished
    Completed,
    /// The trigger did not call for any stage
    Skipped {
        /// Why
        reason: String,
    },
    /// A newer deployment to the same target took over
    Superseded,
}

/// Result of [`Pipeline::run`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Id of the persisted run state
    pub run_id: String,
    /// Stages the trigger called for
    pub plan: RunPlan,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Languages rendered
    pub rendered: Vec<String>,
    /// Publish result, when the site was published
    pub published: Option<PublishResult>,
    /// Release record, when one was created
    pub release: Option<ReleaseRecord>,
}

impl RunReport {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Superseded => 2,
            RunOutcome::Completed | RunOutcome::Skipped { .. } => 0,
        }
    }
}

#[derive(Default)]
struct StageResults {
    rendered: Vec<String>,
    published: Option<PublishResult>,
    release: Option<ReleaseRecord>,
}

/// Wires settings, environment and the pluggable seams into the stages.
///
/// Renderer, deployer, release host and deployment gate default to what
/// the settings describe and can be replaced, which is how the tests run
/// the whole pipeline without external tools or network access.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    runtime: &'a RuntimeConfig,
    env: EnvConfig,
    repo_root: PathBuf,
    renderer: Option<Arc<dyn Renderer>>,
    deployer: Option<Arc<dyn Deployer>>,
    release_host: Option<Arc<dyn ReleaseHost>>,
    gate: Option<DeploymentGate>,
}

impl<'a> Pipeline<'a> {
    /// Pipeline for the repository at `repo_root`
    pub fn new(
        settings: &'a Settings,
        runtime: &'a RuntimeConfig,
        env: EnvConfig,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            runtime,
            env,
            repo_root: repo_root.into(),
            renderer: None,
            deployer: None,
            release_host: None,
            gate: None,
        }
    }

    /// Use `renderer` instead of the configured program
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Use `deployer` instead of the configured deployment method
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    /// Use `host` instead of GitHub
    pub fn with_release_host(mut self, host: Arc<dyn ReleaseHost>) -> Self {
        self.release_host = Some(host);
        self
    }

    /// Use `gate` for deployment locking
    pub fn with_gate(mut self, gate: DeploymentGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Repository root
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Load and structurally validate descriptions
    pub fn load_documents(&self, only: Option<&str>) -> Result<Vec<DocumentDescription>> {
        document::load_all(&self.settings.documents.entries, only)
    }

    /// Validate descriptions, including the renderer's own checks unless
    /// `structure_only` is set. Produces no artifact.
    pub async fn validate(
        &self,
        only: Option<&str>,
        structure_only: bool,
    ) -> Result<Vec<DocumentDescription>> {
        let documents = self.load_documents(only)?;
        if !structure_only {
            let renderer = self.renderer()?;
            let stage = RenderStage::new(renderer.as_ref(), &self.settings.render.output_dir);
            for document in &documents {
                stage.validate(document).await?;
                self.runtime
                    .verbose_println(&format!("{} passed the renderer's checks", document.language));
            }
        }
        Ok(documents)
    }

    /// Render every language, or only `only`
    pub async fn render(&self, only: Option<&str>) -> Result<RenderOutput> {
        let documents = self.load_documents(only)?;
        let renderer = self.renderer()?;
        let build = BuildMetadata::detect(&self.env, &self.repo_root).await;
        let stage = RenderStage::new(renderer.as_ref(), &self.settings.render.output_dir);
        stage.render_all(&documents, &build).await
    }

    /// Artifacts left by an earlier render
    pub fn existing_output(&self) -> Result<RenderOutput> {
        RenderOutput::load(
            &self.settings.render.output_dir,
            &self.settings.documents.languages(),
        )
    }

    /// Publish the site for `output`
    pub async fn publish(&self, output: &RenderOutput) -> Result<PublishResult> {
        let publisher = match &self.deployer {
            Some(deployer) => Publisher::new(self.settings, deployer.clone()),
            None => {
                let repository =
                    github::resolve_repository(self.settings, &self.env, &self.repo_root).await;
                Publisher::from_settings(self.settings, &self.env, &self.repo_root, repository)
            }
        };
        let publisher = match &self.gate {
            Some(gate) => publisher.with_gate(gate.clone()),
            None => publisher,
        };
        publisher
            .with_accent(self.accent())
            .with_dry_run(self.runtime.is_dry_run())
            .publish(output)
            .await
    }

    /// Create the release record for `request`
    pub async fn release(&self, request: &ReleaseRequest, output: &RenderOutput) -> Result<ReleaseRecord> {
        let host = self.release_host().await?;
        ReleaseManager::new(self.settings, host.as_ref(), self.runtime)
            .create(request, output)
            .await
    }

    /// Run the stages `trigger` calls for and persist the run state.
    ///
    /// A deployment superseded by a newer one ends the run as cancelled
    /// and is reported through [`RunOutcome::Superseded`], not as an error.
    pub async fn run(&self, trigger: Trigger) -> Result<RunReport> {
        let plan = trigger.plan(self.settings, &self.repo_root)?;
        let manager = StateManager::new(&self.settings.state_dir);
        let mut state = RunState::new(trigger, self.runtime.is_dry_run());

        if let Some(reason) = plan.skipped.clone() {
            self.runtime.println(&format!("Nothing to do: {reason}"));
            state.add_checkpoint("skipped", Some(serde_json::json!({ "reason": reason })));
            state.set_phase(RunPhase::Completed);
            manager.save(&mut state)?;
            return Ok(RunReport {
                run_id: state.run_id,
                plan,
                outcome: RunOutcome::Skipped { reason },
                rendered: Vec::new(),
                published: None,
                release: None,
            });
        }

        state.set_phase(RunPhase::RenderingAndPublishing);
        manager.save(&mut state)?;

        let mut results = StageResults::default();
        match self.run_stages(&plan, &mut state, &manager, &mut results).await {
            Ok(()) => {
                state.set_phase(RunPhase::Completed);
                manager.save(&mut state)?;
                Ok(RunReport {
                    run_id: state.run_id,
                    plan,
                    outcome: RunOutcome::Completed,
                    rendered: results.rendered,
                    published: results.published,
                    release: results.release,
                })
            }
            Err(e) if e.class() == ErrorClass::Superseded => {
                self.runtime.warning_println(&e.to_string());
                state.add_error(e.to_string(), false);
                state.set_phase(RunPhase::Cancelled);
                manager.save(&mut state)?;
                Ok(RunReport {
                    run_id: state.run_id,
                    plan,
                    outcome: RunOutcome::Superseded,
                    rendered: results.rendered,
                    published: None,
                    release: None,
                })
            }
            Err(e) => {
                state.add_error(e.to_string(), e.is_recoverable());
                state.set_phase(RunPhase::Failed);
                if let Err(save_err) = manager.save(&mut state) {
                    log::warn!("Failed to record the failed run: {}", save_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        plan: &RunPlan,
        state: &mut RunState,
        manager: &StateManager,
        results: &mut StageResults,
    ) -> Result<()> {
        if !plan.render {
            return Ok(());
        }

        self.runtime.section("Render");
        let output = self.render(None).await?;
        results.rendered = output.iter().map(|a| a.language().to_string()).collect();
        self.runtime
            .success_println(&format!("Rendered {}", results.rendered.join(", ")));
        state.add_checkpoint(
            "rendered",
            Some(serde_json::json!({ "languages": results.rendered })),
        );
        manager.save(state)?;

        if plan.publish {
            self.runtime.section("Publish");
            let published = self.publish(&output).await?;
            self.runtime
                .success_println(&format!("Published at {}", published.base_url));
            state.published_url = Some(published.base_url.clone());
            state.add_checkpoint(
                "published",
                Some(serde_json::json!({ "target": published.target })),
            );
            manager.save(state)?;
            results.published = Some(published);
        }

        if let Some(target) = &plan.release {
            state.set_phase(RunPhase::Releasing);
            manager.save(state)?;

            self.runtime.section("Release");
            let request = ReleaseRequest {
                tag: target.tag.clone(),
                prerelease: target.prerelease,
                url: results.published.as_ref().map(|p| p.base_url.clone()),
            };
            let record = self.release(&request, &output).await?;
            self.runtime
                .success_println(&format!("Released {} at {}", record.tag, record.html_url));
            state.release_url = Some(record.html_url.clone());
            state.add_checkpoint("released", Some(serde_json::json!({ "tag": record.tag })));
            manager.save(state)?;
            results.release = Some(record);
        }

        Ok(())
    }

    fn renderer(&self) -> Result<Arc<dyn Renderer>> {
        match &self.renderer {
            Some(renderer) => Ok(renderer.clone()),
            None => Ok(Arc::new(ExternalRenderer::new(self.settings.render.clone())?)),
        }
    }

    async fn release_host(&self) -> Result<Arc<dyn ReleaseHost>> {
        if let Some(host) = &self.release_host {
            return Ok(host.clone());
        }
        if self.runtime.is_dry_run() {
            log::info!("Dry run: releases are recorded in memory only");
            return Ok(Arc::new(MemoryReleaseHost::new()));
        }
        let repository = github::resolve_repository(self.settings, &self.env, &self.repo_root)
            .await
            .ok_or(ReleaseRecordError::MissingRepository)?;
        Ok(Arc::new(GitHubReleaseHost::from_env(
            &self.env,
            &repository,
            &self.settings.release.api_url,
        )?))
    }

    /// Link color of the default language's description, for the landing page
    fn accent(&self) -> Option<String> {
        let entry = self
            .settings
            .documents
            .entry(&self.settings.documents.default_language)?;
        match document::load(entry) {
            Ok(description) => description.color(ColorRole::Links).map(|c| c.to_hex()),
            Err(e) => {
                log::debug!("No accent color: {}", e);
                None
            }
        }
    }
}
