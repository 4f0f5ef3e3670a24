//! Build one source unit

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustwasm_core::{BuildContext, LoaderConfig};
use rustwasm_pipeline::Pipeline;
use tokio::sync::oneshot;

/// What the pipeline reported back
struct Outcome {
    stub: rustwasm_core::Result<String>,
    dependencies: Vec<PathBuf>,
}

/// Host context for a single command-line build
struct CliContext {
    resource: PathBuf,
    dependencies: Vec<PathBuf>,
    done: oneshot::Sender<Outcome>,
}

impl CliContext {
    fn new(resource: PathBuf) -> (Self, oneshot::Receiver<Outcome>) {
        let (done, outcome) = oneshot::channel();
        let ctx = Self {
            resource,
            dependencies: Vec::new(),
            done,
        };
        (ctx, outcome)
    }
}

impl BuildContext for CliContext {
    fn resource_path(&self) -> &Path {
        &self.resource
    }

    fn add_context_dependency(&mut self, path: &Path) {
        self.dependencies.push(path.to_path_buf());
    }

    fn complete(self, outcome: rustwasm_core::Result<String>) {
        // The receiver only goes away if the command itself is torn down
        let _ = self.done.send(Outcome {
            stub: outcome,
            dependencies: self.dependencies,
        });
    }
}

/// Run the build command
pub async fn run(config_path: &str, source: &str, out: Option<&str>) -> Result<()> {
    tracing::debug!("Loading configuration from {}", config_path);
    let config = LoaderConfig::load_or_default(config_path).context("Failed to load configuration")?;

    let pipeline = Pipeline::new(config);
    let (ctx, outcome) = CliContext::new(PathBuf::from(source));

    let build = pipeline.run(ctx);
    tokio::pin!(build);
    tokio::select! {
        _ = &mut build => {}
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping the build");
            pipeline.cancel();
            build.await;
        }
    }

    let outcome = outcome
        .await
        .context("Pipeline finished without reporting a result")?;
    let stub = outcome
        .stub
        .with_context(|| format!("Failed to build {}", source))?;

    for dependency in &outcome.dependencies {
        tracing::info!("Watching {}", dependency.display());
    }

    match out {
        Some(path) => {
            tokio::fs::write(path, &stub)
                .await
                .with_context(|| format!("Failed to write stub to {}", path))?;
            tracing::info!("Wrote stub to {}", path);
        }
        None => print!("{}", stub),
    }

    Ok(())
}
