//! End-to-end pipeline tests with a fake renderer, a directory deployer and
//! the in-memory release host.

#![cfg(unix)]

use async_trait::async_trait;
use cv_release::config::{ConcurrencyPolicy, DeployMethod, Settings};
use cv_release::error::{PipelineError, RenderError};
use cv_release::github::MemoryReleaseHost;
use cv_release::publish::{Deployer, DeploymentGate, DeploymentPermit};
use cv_release::release::ReleaseRecord;
use cv_release::site::{Route, Site, resolve_route};
use cv_release::state::{RunPhase, StateManager};
use cv_release::cli::RuntimeConfig;
use cv_release::{EnvConfig, ErrorClass, Pipeline, RunOutcome, Trigger};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const FAKE_RENDERER: &str = r#"#!/bin/sh
# Mimics `rendercv render <source> --pdf-path <dest> ...`
shift
source="$1"
shift
while [ $# -gt 0 ]; do
  case "$1" in
    --pdf-path)
      shift
      printf '%%PDF-1.7\n%% rendered from %s\n' "$source" > "$1"
      ;;
  esac
  shift
done
# Auxiliary output the stage must not keep
echo "<html></html>" > stray.html
exit 0
"#;

const EN: &str = r##"cv:
  name: Jane Doe
  email: jane@example.org
  sections:
    experience:
      - company: Acme
        position: Engineer
design:
  theme: classic
  colors:
    links: "#0a6b3d"
"##;

const PT: &str = r#"cv:
  name: Jane Doe
  sections:
    experiência:
      - company: Acme
        position: Engenheira
"#;

struct Fixture {
    dir: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        Self::with_policy(ConcurrencyPolicy::Queue)
    }

    fn with_policy(policy: ConcurrencyPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("cv")).unwrap();
        fs::write(root.join("cv/en.yaml"), EN).unwrap();
        fs::write(root.join("cv/pt.yaml"), PT).unwrap();

        let renderer = root.join("fake-rendercv");
        fs::write(&renderer, FAKE_RENDERER).unwrap();
        fs::set_permissions(&renderer, fs::Permissions::from_mode(0o755)).unwrap();

        let mut settings = Settings::default();
        settings.render.program = renderer.to_string_lossy().into_owned();
        settings.publish.base_url = Some("https://jane.github.io/cv/".to_string());
        settings.publish.concurrency = policy;
        settings.publish.deploy = DeployMethod::Directory {
            path: PathBuf::from("www"),
        };
        settings.release.repository = Some("jane/cv".to_string());
        let settings = settings.rebase(root);

        Self { dir, settings }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Swap the renderer script for another one
    fn use_renderer(&self, script: &str) {
        fs::write(&self.settings.render.program, script).unwrap();
    }

    fn output_files(&self) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(&self.settings.render.output_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        files
    }

    fn gate(&self) -> DeploymentGate {
        DeploymentGate::new(self.settings.lock_dir(), self.settings.publish.concurrency)
            .with_poll_interval(Duration::from_millis(10))
    }

    fn pipeline<'a>(&'a self, runtime: &'a RuntimeConfig, host: &MemoryReleaseHost) -> Pipeline<'a> {
        let env = EnvConfig::from_pairs([("GITHUB_SHA", "0123456789abcdef"), ("GITHUB_ACTOR", "jane")]);
        Pipeline::new(&self.settings, runtime, env, self.root())
            .with_release_host(Arc::new(host.clone()))
            .with_gate(self.gate())
    }
}

fn tag(tag: &str) -> Trigger {
    Trigger::Tag {
        tag: tag.to_string(),
    }
}

#[tokio::test]
async fn tag_run_publishes_and_releases_with_the_published_url() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let report = fixture
        .pipeline(&runtime, &host)
        .run(tag("v1.0.0"))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.rendered, vec!["en", "pt"]);
    assert_eq!(report.exit_code(), 0);

    let www = fixture.root().join("www");
    let en = fs::read(www.join("en.pdf")).unwrap();
    let pt = fs::read(www.join("pt.pdf")).unwrap();
    assert!(en.starts_with(b"%PDF-"));
    assert!(pt.starts_with(b"%PDF-"));
    assert_ne!(en, pt);
    let index = fs::read_to_string(www.join("index.html")).unwrap();
    assert!(index.contains("en.pdf") && index.contains("pt.pdf"));

    let releases = host.releases();
    assert_eq!(releases.len(), 1);
    let release = &releases[0];
    assert!(!release.draft);
    assert!(!release.prerelease);
    assert!(release.body.contains("https://jane.github.io/cv/pt.pdf"));
    assert!(release.body.contains("https://jane.github.io/cv/en.pdf"));
    assert_eq!(
        host.asset_content("v1.0.0", "cv-pt-v1.0.0.pdf").unwrap(),
        pt
    );

    let state = StateManager::new(&fixture.settings.state_dir).load().unwrap();
    assert_eq!(state.phase, RunPhase::Completed);
    assert_eq!(state.published_url.as_deref(), Some("https://jane.github.io/cv/"));
    assert_eq!(state.release_url.as_deref(), Some("memory://releases/v1.0.0"));
    assert!(state.has_checkpoint("rendered"));
    assert!(state.has_checkpoint("published"));
    assert!(state.has_checkpoint("released"));
}

#[tokio::test]
async fn rendering_keeps_exactly_one_pdf_per_language() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let output = fixture.pipeline(&runtime, &host).render(None).await.unwrap();
    assert_eq!(output.len(), 2);

    let mut files: Vec<String> = fs::read_dir(&fixture.settings.render.output_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec!["en.build.json", "en.pdf", "pt.build.json", "pt.pdf"]
    );

    let record: serde_json::Value = serde_json::from_slice(
        &fs::read(fixture.settings.render.output_dir.join("pt.build.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(record["language"], "pt");
    assert_eq!(record["build"]["commit"], "0123456789abcdef");
}

/// Writes a PDF header, then dies
const CRASHING_RENDERER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = --pdf-path ]; then shift; printf '%%PDF-1.7\n' > "$1"; fi
  shift
done
echo "KeyError: 'experience'" >&2
exit 1
"#;

/// Renders English, crashes on Portuguese after a partial write
const PT_CRASHING_RENDERER: &str = r#"#!/bin/sh
shift
source="$1"
shift
while [ $# -gt 0 ]; do
  if [ "$1" = --pdf-path ]; then shift; printf '%%PDF-1.7\n' > "$1"; fi
  shift
done
case "$source" in
  *pt.yaml) echo "bad date" >&2; exit 1 ;;
esac
exit 0
"#;

#[tokio::test]
async fn renderer_failure_leaves_no_partial_pdf() {
    let fixture = Fixture::new();
    fixture.use_renderer(CRASHING_RENDERER);
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let err = fixture
        .pipeline(&runtime, &host)
        .render(Some("en"))
        .await
        .unwrap_err();

    match &err {
        PipelineError::Render(RenderError::RendererFailed {
            language,
            code,
            stderr,
        }) => {
            assert_eq!(language, "en");
            assert_eq!(*code, Some(1));
            assert!(stderr.contains("KeyError"), "{stderr}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.class(), ErrorClass::Other);
    assert!(!err.is_recoverable());
    assert!(fixture.output_files().is_empty(), "{:?}", fixture.output_files());
}

#[tokio::test]
async fn renderer_failure_fails_the_tag_run_before_publishing() {
    let fixture = Fixture::new();
    fixture.use_renderer(CRASHING_RENDERER);
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let err = fixture
        .pipeline(&runtime, &host)
        .run(tag("v1.0.0"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Render(RenderError::RendererFailed { .. })
    ));
    assert!(!fixture.root().join("www").exists());
    assert!(host.releases().is_empty());
    let state = StateManager::new(&fixture.settings.state_dir).load().unwrap();
    assert_eq!(state.phase, RunPhase::Failed);
    assert!(!state.has_checkpoint("rendered"));
}

#[tokio::test]
async fn slow_renderer_is_stopped_at_the_timeout() {
    let mut fixture = Fixture::new();
    fixture.settings.render.timeout_secs = Some(1);
    fixture.use_renderer("#!/bin/sh\nexec sleep 30\n");
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let started = std::time::Instant::now();
    let err = fixture
        .pipeline(&runtime, &host)
        .render(Some("pt"))
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(matches!(
        err,
        PipelineError::Render(RenderError::Timeout { ref language, seconds: 1 }) if language == "pt"
    ));
    assert!(fixture.output_files().is_empty(), "{:?}", fixture.output_files());
}

#[tokio::test]
async fn aborted_rerender_does_not_mix_with_the_previous_render() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();
    let pipeline = fixture.pipeline(&runtime, &host);
    pipeline.render(None).await.unwrap();
    assert_eq!(pipeline.existing_output().unwrap().len(), 2);

    fixture.use_renderer(PT_CRASHING_RENDERER);
    pipeline.render(None).await.unwrap_err();

    assert_eq!(fixture.output_files(), vec!["en.build.json", "en.pdf"]);
    let err = pipeline.existing_output().unwrap_err();
    assert_eq!(err.class(), ErrorClass::MissingArtifact);
}

#[tokio::test]
async fn existing_release_is_not_modified() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new().with_release(ReleaseRecord {
        id: 1,
        tag: "v1.0.0".to_string(),
        name: "CV v1.0.0".to_string(),
        body: "original notes".to_string(),
        prerelease: false,
        draft: false,
        html_url: "memory://releases/v1.0.0".to_string(),
        assets: Vec::new(),
    });

    let err = fixture
        .pipeline(&runtime, &host)
        .run(tag("v1.0.0"))
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::DuplicateRelease);
    let releases = host.releases();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].body, "original notes");
    assert!(releases[0].assets.is_empty());

    let state = StateManager::new(&fixture.settings.state_dir).load().unwrap();
    assert_eq!(state.phase, RunPhase::Failed);
    assert_eq!(state.errors.len(), 1);
    assert!(!state.errors[0].recoverable);
}

#[tokio::test]
async fn validating_an_invalid_description_leaves_no_artifact() {
    let fixture = Fixture::new();
    fs::write(
        fixture.root().join("cv/pt.yaml"),
        "cv:\n  sections: {}\ndesign:\n  theme: fancy\n",
    )
    .unwrap();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let err = fixture
        .pipeline(&runtime, &host)
        .validate(Some("pt"), false)
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::InputValidation);
    let message = err.to_string();
    assert!(message.contains("cv.name"), "{message}");
    assert!(message.contains("design.theme"), "{message}");
    assert!(!fixture.settings.render.output_dir.join("pt.pdf").exists());
}

#[tokio::test]
async fn validate_only_mode_produces_no_pdf() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let documents = fixture
        .pipeline(&runtime, &host)
        .validate(None, false)
        .await
        .unwrap();

    assert_eq!(documents.len(), 2);
    let leftovers: Vec<_> = fs::read_dir(&fixture.settings.render.output_dir)
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn push_outside_the_documents_is_skipped() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let report = fixture
        .pipeline(&runtime, &host)
        .run(Trigger::Push {
            git_ref: Some("refs/heads/main".to_string()),
            changed: vec![PathBuf::from("README.md")],
        })
        .await
        .unwrap();

    assert!(matches!(report.outcome, RunOutcome::Skipped { .. }));
    assert_eq!(report.exit_code(), 0);
    assert!(!fixture.settings.render.output_dir.exists());
    assert!(host.releases().is_empty());
}

#[tokio::test]
async fn push_touching_the_documents_publishes_without_release() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();

    let report = fixture
        .pipeline(&runtime, &host)
        .run(Trigger::Push {
            git_ref: Some("refs/heads/main".to_string()),
            changed: vec![PathBuf::from("cv/pt.yaml")],
        })
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.published.is_some());
    assert!(report.release.is_none());
    assert!(fixture.root().join("www/pt.pdf").exists());
    assert!(host.releases().is_empty());
}

#[tokio::test]
async fn published_site_routes_by_query_parameter() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();
    let pipeline = fixture.pipeline(&runtime, &host);

    let output = pipeline.render(None).await.unwrap();
    let published = pipeline.publish(&output).await.unwrap();
    assert_eq!(published.base_url, "https://jane.github.io/cv/");

    let languages = fixture.settings.documents.languages();
    let www = fixture.root().join("www");
    for language in ["en", "pt"] {
        let route = resolve_route(Some(&format!("lang={language}")), &[], &languages, false);
        assert_eq!(route.path(), format!("{language}.pdf"));
        assert!(www.join(route.path()).is_file());
    }
    assert_eq!(resolve_route(None, &["pt-BR"], &languages, false), Route::Landing);

    let index = fs::read_to_string(www.join("index.html")).unwrap();
    assert!(index.contains("#0a6b3d"), "accent color from the description");
}

#[tokio::test]
async fn dry_run_creates_nothing_on_the_hosts() {
    let fixture = Fixture::new();
    let runtime = RuntimeConfig::quiet().with_dry_run(true);
    let host = MemoryReleaseHost::new();

    let report = fixture
        .pipeline(&runtime, &host)
        .run(tag("v1.0.0"))
        .await
        .unwrap();

    assert!(report.published.unwrap().dry_run);
    assert!(!fixture.root().join("www").exists());
    let state = StateManager::new(&fixture.settings.state_dir).load().unwrap();
    assert!(state.dry_run);
}

/// Deployer that waits until a newer deployment shows up, then checks in
struct OvertakenDeployer {
    gate: DeploymentGate,
    newer: Mutex<Option<tokio::task::JoinHandle<cv_release::Result<u64>>>>,
}

#[async_trait]
impl Deployer for OvertakenDeployer {
    fn describe(&self) -> String {
        "overtaken deployer".to_string()
    }

    fn default_base_url(&self) -> Option<String> {
        None
    }

    async fn deploy(&self, _site: &Site, permit: &DeploymentPermit) -> cv_release::Result<()> {
        let gate = self.gate.clone();
        let target = permit.target().to_string();
        let handle = tokio::spawn(async move { gate.enter(&target).await.map(|p| p.ticket()) });
        *self.newer.lock().unwrap() = Some(handle);

        while self.gate.latest_ticket(permit.target())? <= permit.ticket() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        permit.checkpoint()
    }
}

#[tokio::test]
async fn superseded_deployment_cancels_the_run() {
    let fixture = Fixture::with_policy(ConcurrencyPolicy::Preempt);
    let runtime = RuntimeConfig::quiet();
    let host = MemoryReleaseHost::new();
    let deployer = Arc::new(OvertakenDeployer {
        gate: fixture.gate(),
        newer: Mutex::new(None),
    });

    let report = fixture
        .pipeline(&runtime, &host)
        .with_deployer(deployer.clone())
        .run(tag("v1.0.0"))
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Superseded);
    assert_eq!(report.exit_code(), 2);
    assert!(host.releases().is_empty());

    let newer = deployer.newer.lock().unwrap().take().unwrap();
    assert_eq!(newer.await.unwrap().unwrap(), 2);

    let state = StateManager::new(&fixture.settings.state_dir).load().unwrap();
    assert_eq!(state.phase, RunPhase::Cancelled);
}
