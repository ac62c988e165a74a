//! Release notes.

use super::{PlannedAsset, ReleaseRequest};
use crate::metadata::BuildMetadata;
use std::fmt::Write;

/// Markdown body of a release.
///
/// Lists, per language, the published PDF and the redirect link when a site
/// URL is known, the attached assets with their checksums, and where the
/// build came from. `url` is used verbatim apart from a trailing slash.
pub fn generate(
    request: &ReleaseRequest,
    assets: &[PlannedAsset],
    build: Option<&BuildMetadata>,
) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "## Curriculum Vitae {}\n", request.tag);

    if let Some(url) = request.url.as_deref() {
        let base = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        let _ = writeln!(body, "Published at {base}\n");
        for asset in assets {
            let _ = writeln!(
                body,
                "- {}: {base}{}.pdf ({base}?lang={})",
                asset.label, asset.language, asset.language
            );
        }
        body.push('\n');
    }

    let _ = writeln!(body, "### Attached files\n");
    for asset in assets {
        if asset.sha256.is_empty() {
            let _ = writeln!(body, "- `{}` ({})", asset.name, asset.label);
        } else {
            let _ = writeln!(
                body,
                "- `{}` ({}), sha256 `{}`",
                asset.name, asset.label, asset.sha256
            );
        }
    }

    if let Some(build) = build {
        let _ = writeln!(body, "\n### Build\n");
        if let Some(commit) = &build.commit {
            let _ = writeln!(body, "- Commit: {commit}");
        }
        let _ = writeln!(body, "- Built: {}", build.timestamp.to_rfc3339());
        if let Some(actor) = &build.actor {
            let _ = writeln!(body, "- By: {actor}");
        }
        if let Some(run_url) = &build.run_url {
            let _ = writeln!(body, "- Run: {run_url}");
        }
    }

    if request.prerelease {
        let _ = writeln!(body, "\n_This is a pre-release._");
    }
    body
}
