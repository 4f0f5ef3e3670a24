//! Backend strategies
//!
//! A backend turns a [`BuildRequest`] into a binary at the request's
//! destination. Which backend runs is decided by [`SourceKind`] alone.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustwasm_core::config::ToolchainConfig;
use rustwasm_core::{BuildRequest, Result, SourceKind};

use crate::artifact::ArtifactLocator;
use crate::process::{ToolInvocation, Tools};

/// Nested cargo runs must use the project's own `target/` directory
const CARGO_TARGET_DIR: &str = "CARGO_TARGET_DIR";

/// What a backend leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// The binary, always the request's destination
    pub binary: PathBuf,

    /// Paths the host should watch for changes
    pub dependencies: Vec<PathBuf>,
}

/// A source-kind specific build sequence
#[async_trait]
pub trait Backend: Send + Sync {
    /// The source kind this backend handles
    fn kind(&self) -> SourceKind;

    /// Produce the binary for `request` at `request.destination`
    async fn build(&self, request: &BuildRequest, tools: &Tools) -> Result<BuildOutput>;
}

/// Compiles a single `.rs` file with rustc
#[derive(Debug, Clone)]
pub struct DirectSource {
    toolchain: ToolchainConfig,
}

impl DirectSource {
    /// Create the backend
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }

    /// The compiler command for `request`
    pub fn invocation(&self, request: &BuildRequest) -> ToolInvocation {
        ToolInvocation::new(&self.toolchain.rustc)
            .args(self.toolchain.channel_arg())
            .arg(format!("--target={}", self.toolchain.target))
            .arg("--crate-type=cdylib")
            .arg("-O")
            .arg(&request.source)
            .arg("-o")
            .arg(&request.destination)
    }
}

#[async_trait]
impl Backend for DirectSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DirectSource
    }

    async fn build(&self, request: &BuildRequest, tools: &Tools) -> Result<BuildOutput> {
        tracing::info!("Compiling {}", request.source.display());
        tools.run(&self.invocation(request)).await?;

        Ok(BuildOutput {
            binary: request.destination.clone(),
            dependencies: Vec::new(),
        })
    }
}

/// Builds a Cargo project and picks its binary out of `target/`
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    toolchain: ToolchainConfig,
    locator: ArtifactLocator,
}

impl ProjectManifest {
    /// Create the backend
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self {
            toolchain,
            locator: ArtifactLocator::wasm(),
        }
    }

    /// The build tool command for `request`
    pub fn invocation(&self, request: &BuildRequest) -> ToolInvocation {
        ToolInvocation::new(&self.toolchain.cargo)
            .args(self.toolchain.channel_arg())
            .arg("build")
            .joined_arg("--manifest-path=", &request.source)
            .arg(format!("--target={}", self.toolchain.target))
            .arg("--release")
            .env_remove(CARGO_TARGET_DIR)
    }

    /// Where cargo leaves release artifacts for the configured target
    pub fn output_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir
            .join("target")
            .join(&self.toolchain.target)
            .join("release")
    }
}

#[async_trait]
impl Backend for ProjectManifest {
    fn kind(&self) -> SourceKind {
        SourceKind::ProjectManifest
    }

    async fn build(&self, request: &BuildRequest, tools: &Tools) -> Result<BuildOutput> {
        tracing::info!("Building project {}", request.source.display());
        tools.run(&self.invocation(request)).await?;

        let project_dir = request.source_dir();
        self.locator
            .locate_and_copy(&self.output_dir(project_dir), &request.destination)
            .await?;

        Ok(BuildOutput {
            binary: request.destination.clone(),
            dependencies: vec![project_dir.join("src")],
        })
    }
}

/// The backend for each source kind
#[derive(Debug, Clone)]
pub struct Backends {
    direct: DirectSource,
    manifest: ProjectManifest,
}

impl Backends {
    /// Create both backends from one toolchain configuration
    pub fn new(toolchain: &ToolchainConfig) -> Self {
        Self {
            direct: DirectSource::new(toolchain.clone()),
            manifest: ProjectManifest::new(toolchain.clone()),
        }
    }

    /// Pick the backend for `kind`
    pub fn select(&self, kind: SourceKind) -> &dyn Backend {
        match kind {
            SourceKind::DirectSource => &self.direct,
            SourceKind::ProjectManifest => &self.manifest,
        }
    }
}
