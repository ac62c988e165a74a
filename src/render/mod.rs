//! Render stage: document description in, verified PDF out.
//!
//! A renderer writes into a staging path inside the output directory. The
//! stage only moves the file to `<lang>.pdf` after it has checked that the
//! file exists and is a PDF, so a failed render never leaves a partial
//! artifact behind. Build metadata lands next to it as `<lang>.build.json`.

mod external;

pub use external::ExternalRenderer;

use crate::document::DocumentDescription;
use crate::error::{RenderError, Result};
use crate::metadata::BuildMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Something that turns a description into a PDF
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Write exactly one PDF to `pdf_path`, using `scratch` as working
    /// directory for anything else the tool insists on writing
    async fn render(
        &self,
        document: &DocumentDescription,
        pdf_path: &Path,
        scratch: &Path,
    ) -> Result<()>;

    /// Run the tool's own checks without producing output
    async fn validate(&self, document: &DocumentDescription, scratch: &Path) -> Result<()>;
}

/// Contents of `<lang>.build.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Language code
    pub language: String,
    /// Description the PDF was rendered from
    pub source: PathBuf,
    /// PDF file name inside the output directory
    pub file: String,
    /// Hex SHA-256 of the PDF
    pub sha256: String,
    /// PDF size
    pub size_bytes: u64,
    /// Who built it, when, from which revision
    pub build: BuildMetadata,
}

/// One rendered PDF
#[derive(Debug, Clone)]
pub struct RenderArtifact {
    /// Path of `<lang>.pdf`
    pub pdf: PathBuf,
    /// Metadata stored next to it
    pub record: ArtifactRecord,
}

impl RenderArtifact {
    /// Language code
    pub fn language(&self) -> &str {
        &self.record.language
    }
}

/// Artifacts of one render invocation, keyed by language
#[derive(Debug, Clone)]
pub struct RenderOutput {
    dir: PathBuf,
    artifacts: BTreeMap<String, RenderArtifact>,
}

impl RenderOutput {
    /// Empty output rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Output assembled from artifacts rendered elsewhere
    pub fn from_artifacts(
        dir: impl Into<PathBuf>,
        artifacts: impl IntoIterator<Item = RenderArtifact>,
    ) -> Self {
        let mut output = Self::new(dir);
        for artifact in artifacts {
            output.insert(artifact);
        }
        output
    }

    /// Output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact for a language
    pub fn get(&self, language: &str) -> Option<&RenderArtifact> {
        self.artifacts.get(language)
    }

    /// All artifacts in language order
    pub fn iter(&self) -> impl Iterator<Item = &RenderArtifact> {
        self.artifacts.values()
    }

    /// Number of artifacts
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// True when nothing was rendered
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Build metadata of the first artifact
    pub fn build(&self) -> Option<&BuildMetadata> {
        self.iter().next().map(|a| &a.record.build)
    }

    fn insert(&mut self, artifact: RenderArtifact) {
        self.artifacts
            .insert(artifact.record.language.clone(), artifact);
    }

    /// Re-open the artifacts of an earlier render.
    ///
    /// Every language must come from the same render invocation, recognised
    /// by identical build metadata.
    pub fn load(dir: &Path, languages: &[String]) -> Result<Self> {
        let mut output = Self::new(dir);
        for language in languages {
            let pdf = dir.join(pdf_file_name(language));
            let record_path = dir.join(record_file_name(language));
            for path in [&pdf, &record_path] {
                if !path.is_file() {
                    return Err(RenderError::MissingArtifact { path: path.clone() }.into());
                }
            }
            let record: ArtifactRecord = serde_json::from_slice(&std::fs::read(&record_path)?)?;
            if let Some(first) = output.iter().next()
                && first.record.build != record.build
            {
                return Err(RenderError::MixedRenders {
                    language: record.language,
                    other: first.record.language.clone(),
                }
                .into());
            }
            output.insert(RenderArtifact { pdf, record });
        }
        Ok(output)
    }

    /// Fail unless every language has an artifact whose PDF is still on disk
    pub fn ensure_complete(&self, languages: &[String]) -> Result<()> {
        for language in languages {
            match self.get(language) {
                Some(artifact) if artifact.pdf.is_file() => {}
                Some(artifact) => {
                    return Err(RenderError::MissingArtifact {
                        path: artifact.pdf.clone(),
                    }
                    .into());
                }
                None => {
                    return Err(RenderError::MissingArtifact {
                        path: self.dir.join(pdf_file_name(language)),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// `<lang>.pdf`
pub fn pdf_file_name(language: &str) -> String {
    format!("{language}.pdf")
}

/// `<lang>.build.json`
pub fn record_file_name(language: &str) -> String {
    format!("{language}.build.json")
}

/// Drives a [`Renderer`] over descriptions and verifies what it produced
pub struct RenderStage<'a> {
    renderer: &'a dyn Renderer,
    output_dir: PathBuf,
}

impl<'a> RenderStage<'a> {
    /// Stage writing into `output_dir`
    pub fn new(renderer: &'a dyn Renderer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            output_dir: output_dir.into(),
        }
    }

    /// Render every description in order; the first failure aborts.
    ///
    /// Artifacts of earlier renders are removed for every language first, so
    /// an aborted run cannot leave a mix of old and new PDFs behind.
    pub async fn render_all(
        &self,
        documents: &[DocumentDescription],
        build: &BuildMetadata,
    ) -> Result<RenderOutput> {
        for document in documents {
            self.discard_artifact(&document.language).await?;
        }
        let mut output = RenderOutput::new(&self.output_dir);
        for document in documents {
            let artifact = self.render_one(document, build).await?;
            output.insert(artifact);
        }
        Ok(output)
    }

    /// Render one description to `<output_dir>/<lang>.pdf`
    pub async fn render_one(
        &self,
        document: &DocumentDescription,
        build: &BuildMetadata,
    ) -> Result<RenderArtifact> {
        let language = document.language.as_str();
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let final_path = self.output_dir.join(pdf_file_name(language));
        let staging = self.output_dir.join(format!(".{language}.pdf.partial"));
        let scratch = self.output_dir.join(format!(".scratch-{language}"));

        remove_if_exists(&staging).await?;
        self.discard_artifact(language).await?;
        tokio::fs::create_dir_all(&scratch).await?;

        log::info!("Rendering {} from {}", language, document.source.display());
        let rendered = self.renderer.render(document, &staging, &scratch).await;
        discard_scratch(&scratch).await;

        if let Err(e) = rendered {
            remove_if_exists(&staging).await?;
            return Err(e);
        }

        let bytes = match tokio::fs::read(&staging).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::MissingArtifact { path: final_path }.into());
            }
            Err(e) => return Err(e.into()),
        };
        if !bytes.starts_with(PDF_SIGNATURE) {
            remove_if_exists(&staging).await?;
            return Err(RenderError::InvalidArtifact { path: final_path }.into());
        }

        let record = ArtifactRecord {
            language: language.to_string(),
            source: document.source.clone(),
            file: pdf_file_name(language),
            sha256: hex::encode(Sha256::digest(&bytes)),
            size_bytes: bytes.len() as u64,
            build: build.clone(),
        };

        tokio::fs::rename(&staging, &final_path).await?;
        write_record(&self.output_dir.join(record_file_name(language)), &record).await?;
        log::info!("Rendered {} ({} bytes)", final_path.display(), record.size_bytes);

        Ok(RenderArtifact {
            pdf: final_path,
            record,
        })
    }

    async fn discard_artifact(&self, language: &str) -> Result<()> {
        remove_if_exists(&self.output_dir.join(pdf_file_name(language))).await?;
        remove_if_exists(&self.output_dir.join(record_file_name(language))).await
    }

    /// Run the renderer's validate-only mode; leaves nothing behind
    pub async fn validate(&self, document: &DocumentDescription) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let scratch = self
            .output_dir
            .join(format!(".validate-{}", document.language));
        tokio::fs::create_dir_all(&scratch).await?;
        let result = self.renderer.validate(document, &scratch).await;
        discard_scratch(&scratch).await;
        result
    }
}

async fn write_record(path: &Path, record: &ArtifactRecord) -> Result<()> {
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, serde_json::to_vec_pretty(record)?).await?;
    tokio::fs::rename(&temp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn discard_scratch(scratch: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(scratch).await {
        log::warn!("Failed to remove {}: {}", scratch.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Theme;
    use crate::error::PipelineError;
    use std::sync::Mutex;

    /// Writes whatever bytes it was built with
    struct StaticRenderer {
        bytes: Option<Vec<u8>>,
        calls: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Renderer for StaticRenderer {
        async fn render(
            &self,
            _document: &DocumentDescription,
            pdf_path: &Path,
            scratch: &Path,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(pdf_path.to_path_buf());
            tokio::fs::write(scratch.join("cv.html"), "<html/>").await?;
            if let Some(bytes) = &self.bytes {
                tokio::fs::write(pdf_path, bytes).await?;
            }
            Ok(())
        }

        async fn validate(&self, _document: &DocumentDescription, _scratch: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn document(language: &str) -> DocumentDescription {
        DocumentDescription {
            language: language.to_string(),
            label: language.to_uppercase(),
            source: PathBuf::from(format!("cv/{language}.yaml")),
            name: "Jane Doe".to_string(),
            sections: vec!["experience".to_string()],
            theme: Theme::Classic,
            palette: Vec::new(),
        }
    }

    fn build() -> BuildMetadata {
        BuildMetadata {
            commit: Some("abc1234".to_string()),
            timestamp: chrono::Utc::now(),
            actor: Some("jane".to_string()),
            run_url: None,
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn renders_pdf_with_metadata_and_nothing_else() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = StaticRenderer {
            bytes: Some(b"%PDF-1.7 fake".to_vec()),
            calls: Mutex::new(Vec::new()),
        };
        let stage = RenderStage::new(&renderer, dir.path());

        let output = stage
            .render_all(&[document("en"), document("pt")], &build())
            .await
            .expect("render succeeds");

        assert_eq!(output.len(), 2);
        assert_eq!(
            file_names(dir.path()),
            vec!["en.build.json", "en.pdf", "pt.build.json", "pt.pdf"]
        );
        let en = output.get("en").unwrap();
        assert_eq!(en.record.sha256, hex::encode(Sha256::digest(b"%PDF-1.7 fake")));
        assert_eq!(en.record.build.commit.as_deref(), Some("abc1234"));

        let reloaded = RenderOutput::load(dir.path(), &["en".to_string(), "pt".to_string()])
            .expect("artifacts reload");
        assert_eq!(reloaded.get("pt").unwrap().record, output.get("pt").unwrap().record);
    }

    #[tokio::test]
    async fn missing_pdf_after_success_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = StaticRenderer {
            bytes: None,
            calls: Mutex::new(Vec::new()),
        };
        let stage = RenderStage::new(&renderer, dir.path());

        let err = stage.render_one(&document("en"), &build()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::MissingArtifact { .. })
        ));
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn non_pdf_output_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = StaticRenderer {
            bytes: Some(b"<html>oops</html>".to_vec()),
            calls: Mutex::new(Vec::new()),
        };
        let stage = RenderStage::new(&renderer, dir.path());

        let err = stage.render_one(&document("en"), &build()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::InvalidArtifact { .. })
        ));
        assert!(file_names(dir.path()).is_empty());
    }

    /// Writes a PDF for every language, then fails for one of them
    struct FailsFor(&'static str);

    #[async_trait]
    impl Renderer for FailsFor {
        async fn render(
            &self,
            document: &DocumentDescription,
            pdf_path: &Path,
            _scratch: &Path,
        ) -> Result<()> {
            tokio::fs::write(pdf_path, b"%PDF-1.7 half").await?;
            if document.language == self.0 {
                return Err(RenderError::RendererFailed {
                    language: document.language.clone(),
                    code: Some(1),
                    stderr: "unknown section".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn validate(&self, _document: &DocumentDescription, _scratch: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn build_from(commit: &str) -> BuildMetadata {
        BuildMetadata {
            commit: Some(commit.to_string()),
            ..build()
        }
    }

    #[tokio::test]
    async fn aborted_render_leaves_no_artifacts_from_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let languages = ["en".to_string(), "pt".to_string()];
        let good = StaticRenderer {
            bytes: Some(b"%PDF-1.7 old".to_vec()),
            calls: Mutex::new(Vec::new()),
        };
        RenderStage::new(&good, dir.path())
            .render_all(&[document("en"), document("pt")], &build_from("old"))
            .await
            .unwrap();

        let err = RenderStage::new(&FailsFor("pt"), dir.path())
            .render_all(&[document("en"), document("pt")], &build_from("new"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::RendererFailed { .. })
        ));

        assert_eq!(file_names(dir.path()), vec!["en.build.json", "en.pdf"]);
        let err = RenderOutput::load(dir.path(), &languages).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::MissingArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn load_rejects_artifacts_from_different_renders() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = StaticRenderer {
            bytes: Some(b"%PDF-1.7".to_vec()),
            calls: Mutex::new(Vec::new()),
        };
        let stage = RenderStage::new(&renderer, dir.path());
        stage
            .render_all(&[document("en"), document("pt")], &build_from("old"))
            .await
            .unwrap();
        stage
            .render_one(&document("pt"), &build_from("new"))
            .await
            .unwrap();

        let err = RenderOutput::load(dir.path(), &["en".to_string(), "pt".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::MixedRenders { ref language, ref other })
                if language == "pt" && other == "en"
        ));
        assert_eq!(err.class(), crate::error::ErrorClass::MissingArtifact);

        // A single language is consistent with itself
        assert_eq!(
            RenderOutput::load(dir.path(), &["pt".to_string()])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn load_reports_missing_language() {
        let dir = tempfile::tempdir().unwrap();
        let err = RenderOutput::load(dir.path(), &["en".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Render(RenderError::MissingArtifact { .. })
        ));
    }
}
