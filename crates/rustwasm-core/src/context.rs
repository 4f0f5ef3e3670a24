//! The host contract
//!
//! A host bundler owns scheduling and the module graph. It hands the
//! pipeline a [`BuildContext`] and hears back through it exactly once.

use std::path::Path;

use crate::error::Result;

/// What a host exposes to a running build
pub trait BuildContext: Send {
    /// The resource being transformed
    fn resource_path(&self) -> &Path;

    /// Ask the host to rebuild when anything under `path` changes
    fn add_context_dependency(&mut self, path: &Path);

    /// Report the generated stub or the error that stopped the build
    ///
    /// Takes `self` by value, so a context can only be completed once.
    fn complete(self, outcome: Result<String>);
}
