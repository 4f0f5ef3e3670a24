//! In-flight build coalescing
//!
//! Two builds of the same source would race on the same staging path. The
//! registry keeps one shared build per source while it runs; later callers
//! await it instead of starting the toolchain again. Different sources that
//! stage to the same destination take turns on a per-destination lock.
//!
//! Every build runs as its own task, so it finishes and leaves the registry
//! even when all of its callers stopped waiting. Nothing is cached between
//! builds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use rustwasm_core::Error;

use crate::backend::BuildOutput;
use crate::orchestrator::{BuildFailure, Stage};

type SharedOutcome = std::result::Result<BuildOutput, (Stage, Arc<Error>)>;
type SharedBuild = Shared<BoxFuture<'static, SharedOutcome>>;

struct Running {
    destination: PathBuf,
    build: SharedBuild,
}

#[derive(Default)]
struct Registry {
    /// Running builds by canonical source
    builds: HashMap<PathBuf, Running>,

    /// One lock per staging destination in use
    destinations: HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>,
}

/// Registry of builds currently running, keyed by canonical source path
#[derive(Clone, Default)]
pub struct InFlightBuilds {
    registry: Arc<Mutex<Registry>>,
}

impl InFlightBuilds {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the running build for `key`, or start one with `start`
    ///
    /// `start` is only called when no build for `key` is running. The new
    /// build waits until no other build writes `destination`. A failure seen
    /// by several callers arrives as [`Error::Shared`]; a caller that was
    /// alone gets the error itself.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run_or_join<F>(
        &self,
        key: PathBuf,
        destination: PathBuf,
        start: F,
    ) -> std::result::Result<BuildOutput, BuildFailure>
    where
        F: FnOnce() -> BoxFuture<'static, std::result::Result<BuildOutput, BuildFailure>>,
    {
        let build = {
            let mut registry = self.lock();
            match registry.builds.get(&key) {
                Some(running) => {
                    tracing::debug!("Joining in-flight build of {}", key.display());
                    running.build.clone()
                }
                None => {
                    if let Some(other) = registry
                        .builds
                        .iter()
                        .find(|(_, running)| running.destination == destination)
                        .map(|(other, _)| other)
                    {
                        tracing::warn!(
                            "{} and {} both stage to {}; building one after the other",
                            other.display(),
                            key.display(),
                            destination.display()
                        );
                    }

                    let turn = Arc::clone(registry.destinations.entry(destination.clone()).or_default());
                    let build = self.spawn(key.clone(), destination.clone(), turn, start());
                    registry.builds.insert(
                        key,
                        Running {
                            destination,
                            build: build.clone(),
                        },
                    );
                    build
                }
            }
        };

        build.await.map_err(|(stage, error)| BuildFailure {
            stage,
            error: Arc::try_unwrap(error).unwrap_or_else(Error::Shared),
        })
    }

    fn spawn(
        &self,
        key: PathBuf,
        destination: PathBuf,
        turn: Arc<tokio::sync::Mutex<()>>,
        work: BoxFuture<'static, std::result::Result<BuildOutput, BuildFailure>>,
    ) -> SharedBuild {
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let result = {
                let _writing = turn.lock().await;
                work.await
            };
            drop(turn);

            {
                let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
                registry.builds.remove(&key);
                // Only the registry still holds the lock
                if registry
                    .destinations
                    .get(&destination)
                    .is_some_and(|turn| Arc::strong_count(turn) == 1)
                {
                    registry.destinations.remove(&destination);
                }
            }

            result.map_err(|failure| (failure.stage, Arc::new(failure.error)))
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err((
                    Stage::Building,
                    Arc::new(Error::Io(std::io::Error::other(e))),
                ))
            })
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a build for `key` is currently running
    pub fn is_running(&self, key: &Path) -> bool {
        self.lock().builds.contains_key(key)
    }

    /// Number of builds currently running
    pub fn len(&self) -> usize {
        self.lock().builds.len()
    }

    /// Whether no build is running
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
