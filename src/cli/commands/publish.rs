//! Publish command implementation.

use super::{CommandContext, artifacts};
use crate::cli::RuntimeConfig;
use crate::error::Result;

/// Execute publish command
pub(super) async fn execute_publish(
    from_existing: bool,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    let pipeline = context.pipeline(config);
    let output = artifacts(from_existing, config, &pipeline).await?;

    config.section("Publish");
    let published = pipeline.publish(&output).await?;

    if published.dry_run {
        config.println(&format!(
            "Dry run: {} file(s) ready for {}",
            published.files.len(),
            published.base_url
        ));
    } else {
        config.success_println(&format!("Published at {}", published.base_url));
    }
    for file in &published.files {
        config.indent(file);
    }
    Ok(0)
}
