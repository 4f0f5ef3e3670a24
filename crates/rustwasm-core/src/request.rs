//! Build requests and the staging area
//!
//! A request pairs a source unit with the deterministic path its binary is
//! staged at. The same source always maps to the same destination, which is
//! what lets the glue stub reference the binary before it exists.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name that marks a Cargo project
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Extension of single-file sources
pub const SOURCE_EXTENSION: &str = "rs";

/// Extension of staged binaries
pub const WASM_EXTENSION: &str = "wasm";

/// The kind of source unit being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A single `.rs` file compiled straight to a binary
    DirectSource,
    /// A `Cargo.toml` whose build tool controls the output layout
    ProjectManifest,
}

impl SourceKind {
    /// Classify an input path by its extension or file name
    pub fn classify(path: &Path) -> Result<Self> {
        if path.file_name().is_some_and(|name| name == MANIFEST_FILE) {
            return Ok(SourceKind::ProjectManifest);
        }
        if path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION) {
            return Ok(SourceKind::DirectSource);
        }

        let reason = match path.extension() {
            Some(ext) => format!("file type \".{}\" not supported", ext.to_string_lossy()),
            None => "expected a .rs file or a Cargo.toml manifest".to_string(),
        };
        Err(Error::UnsupportedInput {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Name the staged binary is derived from
    ///
    /// Direct sources use the file stem, manifests the name of the directory
    /// that contains them.
    pub fn artifact_name(self, source: &Path) -> Result<String> {
        let name = match self {
            SourceKind::DirectSource => source.file_stem(),
            SourceKind::ProjectManifest => source.parent().and_then(Path::file_name),
        };

        name.map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::UnsupportedInput {
                path: source.to_path_buf(),
                reason: "cannot derive an artifact name from this path".to_string(),
            })
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::DirectSource => f.write_str("direct-source"),
            SourceKind::ProjectManifest => f.write_str("project-manifest"),
        }
    }
}

/// One build of one source unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Canonical path of the source file or manifest
    pub source: PathBuf,

    /// Which backend handles it
    pub kind: SourceKind,

    /// Where the final binary is staged
    pub destination: PathBuf,
}

impl BuildRequest {
    /// Build a request for an already-canonical source path
    pub fn new(source: impl Into<PathBuf>, kind: SourceKind, staging: &StagingArea) -> Result<Self> {
        let source = source.into();
        let destination = staging.destination_for(kind, &source)?;
        Ok(Self {
            source,
            kind,
            destination,
        })
    }

    /// Directory containing the source unit
    pub fn source_dir(&self) -> &Path {
        self.source.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Shared location holding staged binaries
///
/// Contents outlive a single build. Nothing is evicted unless
/// [`StagingArea::clean`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Use an explicit staging root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Stage into the OS temp directory
    pub fn system_temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// The staging root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic destination for a source
    pub fn destination_for(&self, kind: SourceKind, source: &Path) -> Result<PathBuf> {
        let name = kind.artifact_name(source)?;
        Ok(self.root.join(format!("{}.{}", name, WASM_EXTENSION)))
    }

    /// Create the staging root if it does not exist
    pub async fn ensure(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::fs(&self.root, e))
    }

    /// Remove staged binaries, returning how many were deleted
    pub async fn clean(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::fs(&self.root, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(&self.root, e))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| Error::fs(&path, e))?
                .is_file();
            if is_file && path.extension().is_some_and(|ext| ext == WASM_EXTENSION) {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| Error::fs(&path, e))?;
                tracing::debug!("Removed staged binary {}", path.display());
                removed += 1;
            }
        }

        Ok(removed)
    }
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::system_temp()
    }
}
