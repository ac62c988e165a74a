//! Validate command implementation.
//!
//! Checks every description (or one language) without producing artifacts.

use super::CommandContext;
use crate::cli::RuntimeConfig;
use crate::error::Result;

/// Execute validate command
pub(super) async fn execute_validate(
    lang: Option<&str>,
    structure_only: bool,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    config.verbose_println("Validating document descriptions...");

    let documents = context
        .pipeline(config)
        .validate(lang, structure_only)
        .await?;

    for document in &documents {
        config.success_println(&format!(
            "{} ({}): {}, {} section(s), theme {}",
            document.language,
            document.label,
            document.name,
            document.sections.len(),
            document.theme
        ));
    }
    if structure_only {
        config.verbose_println("Renderer checks skipped (--structure-only)");
    }
    Ok(0)
}
