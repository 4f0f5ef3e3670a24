//! Test helpers: a fake toolchain and a recording host.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rustwasm_core::{BuildContext, Error, LoaderConfig, Result};
use tempfile::TempDir;
use tokio::sync::oneshot;

use crate::process::{CancelToken, ToolInvocation, ToolRunner};

/// Loader config staging into `<work>/stage`
pub fn config_for(work: &TempDir) -> LoaderConfig {
    LoaderConfig {
        staging_dir: Some(work.path().join("stage")),
        ..Default::default()
    }
}

/// Pretends to be rustc, cargo and wasm-gc, recording every invocation.
///
/// - `rustc` writes a stub binary to its `-o` path
/// - `cargo` creates the release directory next to the manifest and fills it
///   with the configured file names
/// - anything else succeeds without side effects
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<ToolInvocation>>,
    produce: Vec<String>,
    fail: Option<String>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// File names `cargo` leaves in the release directory
    pub fn producing(mut self, files: &[&str]) -> Self {
        self.produce = files.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Make every run of `program` exit with status 1
    pub fn failing(mut self, program: &str) -> Self {
        self.fail = Some(program.to_string());
        self
    }

    /// Sleep before each run completes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }
}

#[async_trait]
impl ToolRunner for RecordingRunner {
    async fn run(&self, invocation: &ToolInvocation, _cancel: &CancelToken) -> Result<()> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.as_deref() == Some(invocation.program.as_str()) {
            return Err(Error::ToolInvocation {
                tool: invocation.program.clone(),
                status: Some(1),
                stderr: "simulated failure\n".to_string(),
            });
        }

        match invocation.program.as_str() {
            "rustc" => {
                let output = invocation.args.last().expect("rustc output path");
                std::fs::write(output, b"\0asm\x01\0\0\0")?;
            }
            "cargo" => {
                let manifest = invocation
                    .args
                    .iter()
                    .find_map(|a| a.to_str()?.strip_prefix("--manifest-path=").map(PathBuf::from))
                    .expect("manifest path");
                let release = manifest
                    .parent()
                    .unwrap()
                    .join("target/wasm32-unknown-unknown/release");
                std::fs::create_dir_all(&release)?;
                for name in &self.produce {
                    std::fs::write(release.join(name), b"\0asm\x01\0\0\0")?;
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// What a [`RecordingContext`] was told
#[derive(Debug)]
pub struct Report {
    pub outcome: Result<String>,
    pub dependencies: Vec<PathBuf>,
}

/// A host that forwards its completion to a channel
pub struct RecordingContext {
    resource: PathBuf,
    dependencies: Vec<PathBuf>,
    report: oneshot::Sender<Report>,
}

impl RecordingContext {
    pub fn new(resource: &Path) -> (Self, oneshot::Receiver<Report>) {
        let (tx, rx) = oneshot::channel();
        let ctx = Self {
            resource: resource.to_path_buf(),
            dependencies: Vec::new(),
            report: tx,
        };
        (ctx, rx)
    }
}

impl BuildContext for RecordingContext {
    fn resource_path(&self) -> &Path {
        &self.resource
    }

    fn add_context_dependency(&mut self, path: &Path) {
        self.dependencies.push(path.to_path_buf());
    }

    fn complete(self, outcome: Result<String>) {
        let _ = self.report.send(Report {
            outcome,
            dependencies: self.dependencies,
        });
    }
}
