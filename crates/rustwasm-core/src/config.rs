//! Configuration parsing and validation
//!
//! Loader settings live in `rustwasm.yaml`. Every field has a default, so an
//! absent file or an empty document yields a working configuration.
//!
//! ```yaml
//! staging_dir: /tmp/rustwasm
//! toolchain:
//!   channel: nightly
//!   target: wasm32-unknown-unknown
//!   timeout_secs: 600
//! size_reducer:
//!   program: wasm-gc
//! stub:
//!   payload: instance
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::request::StagingArea;

/// Default configuration file name
pub const CONFIG_FILE: &str = "rustwasm.yaml";

/// Root loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Staging root for built binaries (defaults to the OS temp directory)
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,

    /// Compiler and build tool settings
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Post-processing tool settings
    #[serde(default)]
    pub size_reducer: SizeReducerConfig,

    /// Generated stub settings
    #[serde(default)]
    pub stub: StubConfig,
}

/// Compiler and build tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Rustup channel passed as `+<channel>`, e.g. `nightly`
    #[serde(default)]
    pub channel: Option<String>,

    /// Cross-compilation target
    #[serde(default = "default_target")]
    pub target: String,

    /// Single-file compiler executable
    #[serde(default = "default_rustc")]
    pub rustc: String,

    /// Project build tool executable
    #[serde(default = "default_cargo")]
    pub cargo: String,

    /// Upper bound for any single tool run, `null` for none
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            channel: None,
            target: default_target(),
            rustc: default_rustc(),
            cargo: default_cargo(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_target() -> String {
    "wasm32-unknown-unknown".to_string()
}

fn default_rustc() -> String {
    "rustc".to_string()
}

fn default_cargo() -> String {
    "cargo".to_string()
}

fn default_timeout_secs() -> Option<u64> {
    Some(600)
}

impl ToolchainConfig {
    /// The `+channel` toolchain override, if one is configured
    pub fn channel_arg(&self) -> Option<String> {
        self.channel.as_ref().map(|c| format!("+{}", c))
    }

    /// Timeout applied to every tool invocation
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Post-processing tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeReducerConfig {
    /// Executable that shrinks a binary in place
    #[serde(default = "default_size_reducer")]
    pub program: String,

    /// Extra arguments placed before the input and output paths
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SizeReducerConfig {
    fn default() -> Self {
        Self {
            program: default_size_reducer(),
            args: Vec::new(),
        }
    }
}

fn default_size_reducer() -> String {
    "wasm-gc".to_string()
}

/// Generated stub settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubConfig {
    /// What the stub's exported promise resolves to
    #[serde(default)]
    pub payload: StubPayload,
}

/// What the generated stub resolves to once evaluated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StubPayload {
    /// The result of `WebAssembly.instantiate(bytes)`
    #[default]
    Instance,
    /// The raw `ArrayBuffer`
    Bytes,
}

impl LoaderConfig {
    /// Load configuration from a directory or file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to a directory containing `rustwasm.yaml`, or the file itself
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = resolve_config_path(path.as_ref());

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config = Self::from_yaml(&contents)?;
        tracing::debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Like [`LoaderConfig::load`], but falls back to defaults when the file is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = resolve_config_path(path.as_ref());
        if config_path.exists() {
            Self::load(config_path)
        } else {
            tracing::debug!(
                "No configuration at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default())
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values no tool invocation could succeed with
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("toolchain.target", &self.toolchain.target),
            ("toolchain.rustc", &self.toolchain.rustc),
            ("toolchain.cargo", &self.toolchain.cargo),
            ("size_reducer.program", &self.size_reducer.program),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::ConfigInvalid {
                    message: format!("{} must not be empty", field),
                });
            }
        }

        if self.toolchain.channel.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::ConfigInvalid {
                message: "toolchain.channel must not be empty when set".to_string(),
            });
        }

        if self.toolchain.timeout_secs == Some(0) {
            return Err(Error::ConfigInvalid {
                message: "toolchain.timeout_secs must be positive; use null to disable".to_string(),
            });
        }

        Ok(())
    }

    /// The staging area builds are written into
    pub fn staging(&self) -> StagingArea {
        match &self.staging_dir {
            Some(dir) => StagingArea::new(dir),
            None => StagingArea::system_temp(),
        }
    }
}

fn resolve_config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    }
}
