//! Render command implementation.

use super::CommandContext;
use crate::cli::RuntimeConfig;
use crate::error::Result;

/// Execute render command
pub(super) async fn execute_render(
    lang: Option<&str>,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    let output = context.pipeline(config).render(lang).await?;

    for artifact in output.iter() {
        config.success_println(&format!(
            "{} -> {} ({} bytes)",
            artifact.language(),
            artifact.pdf.display(),
            artifact.record.size_bytes
        ));
        config.verbose_println(&format!("sha256 {}", artifact.record.sha256));
    }
    Ok(0)
}
