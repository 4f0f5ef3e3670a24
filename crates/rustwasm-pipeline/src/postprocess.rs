//! In-place binary size reduction

use std::path::Path;

use rustwasm_core::Result;
use rustwasm_core::config::SizeReducerConfig;

use crate::process::{ToolInvocation, Tools};

/// Runs the size reducer over a staged binary
#[derive(Debug, Clone)]
pub struct PostProcessor {
    program: String,
    args: Vec<String>,
}

impl PostProcessor {
    /// Create a post-processor from configuration
    pub fn new(config: &SizeReducerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    /// `<program> [args...] <binary> <binary>`
    pub fn invocation(&self, binary: &Path) -> ToolInvocation {
        ToolInvocation::new(&self.program)
            .args(&self.args)
            .arg(binary)
            .arg(binary)
    }

    /// Shrink `binary` in place
    ///
    /// On failure the file may be truncated or half-written and must not be
    /// served.
    pub async fn run(&self, binary: &Path, tools: &Tools) -> Result<()> {
        tracing::debug!("Post-processing {}", binary.display());
        tools.run(&self.invocation(binary)).await
    }
}
