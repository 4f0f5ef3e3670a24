//! rustwasm Pipeline
//!
//! This crate turns a Rust source unit into a staged WASM binary and the
//! glue stub a host module system loads.
//!
//! # Pipeline Overview
//!
//! ```text
//! ┌──────────┐     ┌─────────┐     ┌─────────┐     ┌─────────┐
//! │  Source  │────▶│  rustc  │────▶│ wasm-gc │────▶│  Glue   │
//! │(.rs/toml)│     │ / cargo │     │(shrink) │     │ (stub)  │
//! └──────────┘     └─────────┘     └─────────┘     └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use rustwasm_core::LoaderConfig;
//! use rustwasm_pipeline::Pipeline;
//!
//! let pipeline = Pipeline::new(LoaderConfig::default());
//! let module = pipeline.compile("crates/add/Cargo.toml".as_ref()).await?;
//! println!("{}", module.stub);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod backend;
pub mod glue;
pub mod inflight;
pub mod orchestrator;
pub mod postprocess;
pub mod process;

#[cfg(test)]
pub(crate) mod testutil;

pub use artifact::ArtifactLocator;
pub use backend::{Backend, BuildOutput, DirectSource, ProjectManifest};
pub use orchestrator::{BuildFailure, CompiledModule, Pipeline, Stage};
pub use process::{CancelToken, SystemRunner, ToolInvocation, ToolRunner};
