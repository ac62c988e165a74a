//! Release command implementation.

use super::{CommandContext, artifacts};
use crate::cli::{Command, RuntimeConfig};
use crate::error::Result;
use crate::release::ReleaseRequest;

/// Execute release command
pub(super) async fn execute_release(
    command: &Command,
    config: &RuntimeConfig,
    context: &CommandContext,
) -> Result<i32> {
    let Command::Release {
        tag,
        prerelease,
        url,
        from_existing,
    } = command
    else {
        unreachable!("execute_release called with non-Release command");
    };

    let pipeline = context.pipeline(config);
    let output = artifacts(*from_existing, config, &pipeline).await?;

    config.section("Release");
    let request = ReleaseRequest {
        tag: tag.trim().to_string(),
        prerelease: *prerelease,
        url: url.clone(),
    };
    let record = pipeline.release(&request, &output).await?;

    config.success_println(&format!("Released {} at {}", record.tag, record.html_url));
    for asset in &record.assets {
        config.indent(&format!("{} ({} bytes)", asset.name, asset.size));
    }
    Ok(0)
}
