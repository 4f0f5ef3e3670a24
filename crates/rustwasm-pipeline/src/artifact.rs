//! Artifact discovery and relocation
//!
//! Build tools choose their own output file names. The locator scans an
//! output directory for the one binary with the wanted extension and moves
//! a copy of it to the staging destination.

use std::io::Write;
use std::path::{Path, PathBuf};

use rustwasm_core::request::WASM_EXTENSION;
use rustwasm_core::{Error, Result};

/// Finds the single build output with a given extension
#[derive(Debug, Clone)]
pub struct ArtifactLocator {
    extension: String,
}

impl ArtifactLocator {
    /// Locate files ending in `.<extension>`
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Locate `.wasm` files
    pub fn wasm() -> Self {
        Self::new(WASM_EXTENSION)
    }

    /// Find the only matching file directly inside `dir`
    ///
    /// Subdirectories are not searched. Zero matches and several matches
    /// are both errors; several matches are never resolved by picking one.
    pub async fn find(&self, dir: &Path) -> Result<PathBuf> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::fs(dir, e))?;

        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::fs(dir, e))? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == self.extension.as_str()) {
                continue;
            }
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Error::fs(&path, e))?;
            if metadata.is_file() {
                matches.push(path);
            }
        }
        matches.sort();

        match matches.len() {
            0 => Err(Error::ArtifactNotFound {
                dir: dir.to_path_buf(),
                extension: self.extension.clone(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::ArtifactAmbiguity {
                dir: dir.to_path_buf(),
                extension: self.extension.clone(),
                matches,
            }),
        }
    }

    /// Copy `artifact` to `destination`, returning the bytes written
    ///
    /// The copy lands in a temporary file next to the destination and is
    /// renamed over it once flushed, so the destination is never partial.
    pub async fn relocate(&self, artifact: &Path, destination: &Path) -> Result<u64> {
        let artifact = artifact.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || copy_atomic(&artifact, &destination))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// [`find`](Self::find) then [`relocate`](Self::relocate); returns the artifact used
    pub async fn locate_and_copy(&self, dir: &Path, destination: &Path) -> Result<PathBuf> {
        let artifact = self.find(dir).await?;
        tracing::debug!("Found artifact {}", artifact.display());

        let bytes = self.relocate(&artifact, destination).await?;
        tracing::info!(
            "Copied {} ({} bytes) to {}",
            artifact.display(),
            bytes,
            destination.display()
        );

        Ok(artifact)
    }
}

fn copy_atomic(source: &Path, destination: &Path) -> Result<u64> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut reader = std::fs::File::open(source).map_err(|e| Error::fs(source, e))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".rustwasm-")
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(|e| Error::fs(parent, e))?;

    let copied = std::io::copy(&mut reader, staged.as_file_mut())
        .map_err(|e| Error::fs(staged.path(), e))?;
    staged.as_file_mut().flush().map_err(|e| Error::fs(staged.path(), e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| Error::fs(staged.path(), e))?;

    staged
        .persist(destination)
        .map_err(|e| Error::fs(destination, e.error))?;

    Ok(copied)
}
