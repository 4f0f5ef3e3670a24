//! rustwasm Core Library
//!
//! This crate provides the shared vocabulary of the rustwasm loader:
//! - Error taxonomy for every pipeline stage
//! - Loader configuration (`rustwasm.yaml`)
//! - Build requests and the staging area
//! - The [`BuildContext`] contract a host implements
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Request   │────▶│   Staging   │
//! │ (.rs/.toml) │     │ (kind+dest) │     │   (.wasm)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod error;
pub mod request;

pub use config::{LoaderConfig, StubPayload};
pub use context::BuildContext;
pub use error::{Error, Result};
pub use request::{BuildRequest, SourceKind, StagingArea};
