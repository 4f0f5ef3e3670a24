//! Clear the staging area

use anyhow::{Context, Result};
use rustwasm_core::LoaderConfig;

/// Run the clean command
pub async fn run(config_path: &str) -> Result<()> {
    let config = LoaderConfig::load_or_default(config_path).context("Failed to load configuration")?;
    let staging = config.staging();

    let removed = staging
        .clean()
        .await
        .with_context(|| format!("Failed to clean {}", staging.root().display()))?;

    tracing::info!(
        "Removed {} staged binaries from {}",
        removed,
        staging.root().display()
    );
    Ok(())
}
