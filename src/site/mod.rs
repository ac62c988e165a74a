//! Static site: a landing page plus one PDF per language.

mod route;
mod template;

pub use route::{resolve_route, Route};

use crate::config::Settings;
use crate::error::{PublishError, Result};
use crate::render::{pdf_file_name, RenderOutput};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.html";
const DEFAULT_ACCENT: &str = "#004f90";

/// A built site ready for deployment
#[derive(Debug, Clone)]
pub struct Site {
    /// Staging directory holding the files
    pub root: PathBuf,
    /// Language codes, default first
    pub languages: Vec<String>,
    /// File names relative to `root`
    pub files: Vec<String>,
}

#[derive(Serialize)]
struct LandingEntry {
    language: String,
    label: String,
    file: String,
}

#[derive(Serialize)]
struct LandingContext {
    title: String,
    default_language: String,
    languages_json: String,
    auto_detect: bool,
    accent: String,
    entries: Vec<LandingEntry>,
    updated: Option<String>,
    commit: Option<String>,
}

/// Builds [`Site`]s from render output
pub struct SiteBuilder<'a> {
    settings: &'a Settings,
    accent: Option<String>,
}

impl<'a> SiteBuilder<'a> {
    /// Builder for the configured languages
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            accent: None,
        }
    }

    /// Link color, usually the CV's own link color
    pub fn with_accent(mut self, accent: Option<String>) -> Self {
        self.accent = accent;
        self
    }

    /// Write the site into `staging`, replacing anything already there
    pub fn build(&self, output: &RenderOutput, staging: &Path) -> Result<Site> {
        let languages = self.settings.documents.languages();
        output.ensure_complete(&languages)?;

        if staging.exists() {
            std::fs::remove_dir_all(staging)?;
        }
        std::fs::create_dir_all(staging)?;

        let mut files = Vec::with_capacity(languages.len() + 2);
        for language in &languages {
            // ensure_complete guarantees the artifact
            let Some(artifact) = output.get(language) else {
                continue;
            };
            let name = pdf_file_name(language);
            std::fs::copy(&artifact.pdf, staging.join(&name))?;
            files.push(name);
        }

        let html = self.landing_page(output, &languages)?;
        std::fs::write(staging.join(INDEX_FILE), html)?;
        files.push(INDEX_FILE.to_string());

        // GitHub Pages would otherwise run the files through Jekyll
        std::fs::write(staging.join(".nojekyll"), "")?;
        files.push(".nojekyll".to_string());

        log::info!("Built site with {} file(s) in {}", files.len(), staging.display());
        Ok(Site {
            root: staging.to_path_buf(),
            languages,
            files,
        })
    }

    fn landing_page(&self, output: &RenderOutput, languages: &[String]) -> Result<String> {
        let documents = &self.settings.documents;
        let entries = languages
            .iter()
            .filter_map(|language| documents.entry(language))
            .map(|entry| LandingEntry {
                language: entry.language.clone(),
                label: entry.label.clone(),
                file: pdf_file_name(&entry.language),
            })
            .collect();

        let build = output.build();
        let context = LandingContext {
            title: self.settings.publish.title.clone(),
            default_language: documents.default_language.clone(),
            languages_json: serde_json::to_string(languages)?,
            auto_detect: self.settings.publish.auto_detect_language,
            accent: self
                .accent
                .clone()
                .unwrap_or_else(|| DEFAULT_ACCENT.to_string()),
            entries,
            updated: build.map(|b| b.timestamp.format("%Y-%m-%d").to_string()),
            commit: build.and_then(|b| b.short_commit().map(str::to_string)),
        };

        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars
            .register_template_string("landing", template::LANDING_PAGE)
            .map_err(|e| PublishError::Template {
                reason: e.to_string(),
            })?;
        let html = handlebars
            .render("landing", &context)
            .map_err(|e| PublishError::Template {
                reason: e.to_string(),
            })?;
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::BuildMetadata;
    use crate::render::{ArtifactRecord, RenderArtifact};

    fn output(dir: &Path, languages: &[&str]) -> RenderOutput {
        let artifacts: Vec<RenderArtifact> = languages
            .iter()
            .map(|language| {
                let pdf = dir.join(format!("{language}.pdf"));
                std::fs::write(&pdf, format!("%PDF-1.7 {language}")).unwrap();
                RenderArtifact {
                    pdf,
                    record: ArtifactRecord {
                        language: language.to_string(),
                        source: PathBuf::from(format!("cv/{language}.yaml")),
                        file: format!("{language}.pdf"),
                        sha256: String::new(),
                        size_bytes: 0,
                        build: BuildMetadata {
                            commit: Some("0123456789".to_string()),
                            timestamp: chrono::Utc::now(),
                            actor: None,
                            run_url: None,
                        },
                    },
                }
            })
            .collect();
        RenderOutput::from_artifacts(dir, artifacts)
    }

    #[test]
    fn builds_landing_page_and_distinct_pdfs() {
        let out = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let settings = Settings::default();

        let site = SiteBuilder::new(&settings)
            .build(&output(out.path(), &["en", "pt"]), staging.path())
            .expect("site builds");

        assert_eq!(site.languages, vec!["en", "pt"]);
        let en = std::fs::read(staging.path().join("en.pdf")).unwrap();
        let pt = std::fs::read(staging.path().join("pt.pdf")).unwrap();
        assert_ne!(en, pt);

        let index = std::fs::read_to_string(staging.path().join("index.html")).unwrap();
        assert!(index.contains(r#"<a href="en.pdf" hreflang="en">English</a>"#));
        assert!(index.contains(r#"<a href="pt.pdf" hreflang="pt">Português</a>"#));
        assert!(index.contains(r#"var languages = ["en","pt"];"#));
        assert!(index.contains("var autoDetect = false;"));
        assert!(index.contains("from 0123456"));
        assert!(staging.path().join(".nojekyll").exists());
    }

    #[test]
    fn auto_detection_is_an_explicit_opt_in() {
        let out = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.publish.auto_detect_language = true;

        SiteBuilder::new(&settings)
            .build(&output(out.path(), &["en", "pt"]), staging.path())
            .expect("site builds");

        let index = std::fs::read_to_string(staging.path().join("index.html")).unwrap();
        assert!(index.contains("var autoDetect = true;"));
    }

    #[test]
    fn missing_language_fails_the_build() {
        let out = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let settings = Settings::default();

        let err = SiteBuilder::new(&settings)
            .build(&output(out.path(), &["en"]), staging.path())
            .unwrap_err();
        assert!(err.to_string().contains("pt.pdf"), "{err}");
    }
}
