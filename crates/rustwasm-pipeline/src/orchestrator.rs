//! Pipeline orchestration
//!
//! ```text
//! SelectingBackend ──▶ Building ──▶ PostProcessing ──▶ Emitting ──▶ Done
//!        │                │               │                │
//!        └────────────────┴───────┬───────┴────────────────┘
//!                                 ▼
//!                               Failed
//! ```
//!
//! Stages run strictly in order. The first error ends the run and is
//! reported once; nothing is retried.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use rustwasm_core::{
    BuildContext, BuildRequest, Error, LoaderConfig, Result, SourceKind, StagingArea,
};

use crate::backend::{Backends, BuildOutput};
use crate::glue;
use crate::inflight::InFlightBuilds;
use crate::postprocess::PostProcessor;
use crate::process::{CancelToken, SystemRunner, ToolRunner, Tools};

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Classifying the input and deriving the destination
    SelectingBackend,
    /// Running the backend
    Building,
    /// Shrinking the staged binary
    PostProcessing,
    /// Rendering the glue stub
    Emitting,
    /// Finished successfully
    Done,
    /// Stopped by an error
    Failed,
}

impl Stage {
    /// The stage after this one on the success path
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::SelectingBackend => Some(Stage::Building),
            Stage::Building => Some(Stage::PostProcessing),
            Stage::PostProcessing => Some(Stage::Emitting),
            Stage::Emitting => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    /// Whether no further stage can run
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SelectingBackend => "selecting-backend",
            Stage::Building => "building",
            Stage::PostProcessing => "post-processing",
            Stage::Emitting => "emitting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Logs stage transitions for one source
struct StageTracker<'a> {
    source: &'a Path,
    stage: Stage,
}

impl<'a> StageTracker<'a> {
    fn starting_at(source: &'a Path, stage: Stage) -> Self {
        tracing::debug!(stage = %stage, "{}", source.display());
        Self { source, stage }
    }

    /// Move to the next stage on the success path
    fn advance(&mut self) {
        if let Some(next) = self.stage.next() {
            tracing::debug!(from = %self.stage, to = %next, "{}", self.source.display());
            self.stage = next;
        }
    }

    /// Jump to `stage`, skipping stages another tracker logged
    fn skip_to(&mut self, stage: Stage) {
        tracing::debug!(from = %self.stage, to = %stage, "{}", self.source.display());
        self.stage = stage;
    }

    /// Like [`check`](Self::check), keeping the stage the error happened in
    fn attempt<T>(&mut self, result: Result<T>) -> std::result::Result<T, BuildFailure> {
        let stage = self.stage;
        self.check(result)
            .map_err(|error| BuildFailure { stage, error })
    }

    /// Enter `Failed` for an error raised under another tracker
    fn failed(&mut self, failure: BuildFailure) -> Error {
        tracing::debug!(
            stage = %failure.stage,
            "{} failed: {}",
            self.source.display(),
            failure.error
        );
        self.stage = Stage::Failed;
        failure.error
    }

    /// Pass `result` through, entering `Failed` on error
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !self.stage.is_terminal() {
                tracing::debug!(
                    stage = %self.stage,
                    "{} failed: {}",
                    self.source.display(),
                    err
                );
                self.stage = Stage::Failed;
            }
        }
        result
    }
}

/// An error from a build, with the stage it stopped in
#[derive(Debug)]
pub struct BuildFailure {
    /// Stage that was running when the error happened
    pub stage: Stage,

    /// What went wrong
    pub error: Error,
}

/// A finished build, ready to hand to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    /// The staged binary
    pub binary: PathBuf,

    /// Paths the host should watch
    pub dependencies: Vec<PathBuf>,

    /// Generated glue stub
    pub stub: String,
}

struct Inner {
    config: LoaderConfig,
    staging: StagingArea,
    tools: Tools,
    backends: Backends,
    post: PostProcessor,
    inflight: InFlightBuilds,
}

impl Inner {
    /// Building and post-processing; the unit shared by coalesced callers
    async fn produce(&self, request: BuildRequest) -> std::result::Result<BuildOutput, BuildFailure> {
        let mut stages = StageTracker::starting_at(&request.source, Stage::Building);

        stages.attempt(self.staging.ensure().await)?;
        let backend = self.backends.select(request.kind);
        let output = stages.attempt(backend.build(&request, &self.tools).await)?;

        stages.advance();
        stages.attempt(self.post.run(&output.binary, &self.tools).await)?;

        Ok(output)
    }
}

/// Turns source units into staged binaries and glue stubs
///
/// Cloning is cheap and clones share the in-flight registry and the
/// cancellation token.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Create a pipeline that runs real tools
    pub fn new(config: LoaderConfig) -> Self {
        let runner = SystemRunner::new(config.toolchain.timeout());
        Self::with_runner(config, Arc::new(runner))
    }

    /// Create a pipeline that runs tools through `runner`
    pub fn with_runner(config: LoaderConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let staging = config.staging();
        let backends = Backends::new(&config.toolchain);
        let post = PostProcessor::new(&config.size_reducer);

        Self {
            inner: Arc::new(Inner {
                staging,
                tools: Tools::new(runner, CancelToken::new()),
                backends,
                post,
                inflight: InFlightBuilds::new(),
                config,
            }),
        }
    }

    /// The configuration this pipeline was built with
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Where binaries are staged
    pub fn staging(&self) -> &StagingArea {
        &self.inner.staging
    }

    /// Stop every running and future tool invocation of this pipeline
    pub fn cancel(&self) {
        tracing::info!("Cancelling pipeline");
        self.inner.tools.cancel_token().cancel();
    }

    /// Classify `source` and derive its request
    ///
    /// Unsupported inputs are rejected before the filesystem is touched.
    pub async fn prepare(&self, source: &Path) -> Result<BuildRequest> {
        let kind = SourceKind::classify(source)?;
        let canonical = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| Error::fs(source, e))?;
        tracing::debug!("{} handled by the {} backend", canonical.display(), kind);
        BuildRequest::new(canonical, kind, &self.inner.staging)
    }

    /// Build and post-process `source`, joining a running build of the same source
    pub async fn build(&self, source: &Path) -> Result<BuildOutput> {
        let request = self.prepare(source).await?;
        self.build_request(request)
            .await
            .map_err(|failure| failure.error)
    }

    async fn build_request(
        &self,
        request: BuildRequest,
    ) -> std::result::Result<BuildOutput, BuildFailure> {
        let inner = Arc::clone(&self.inner);
        let key = request.source.clone();
        let destination = request.destination.clone();
        self.inner
            .inflight
            .run_or_join(key, destination, move || {
                async move { inner.produce(request).await }.boxed()
            })
            .await
    }

    /// Run every stage for `source` and return the result
    pub async fn compile(&self, source: &Path) -> Result<CompiledModule> {
        let mut stages = StageTracker::starting_at(source, Stage::SelectingBackend);

        let request = stages.check(self.prepare(source).await)?;
        stages.advance();

        // Building and post-processing are traced by the shared build
        let output = match self.build_request(request).await {
            Ok(output) => output,
            Err(failure) => return Err(stages.failed(failure)),
        };
        stages.skip_to(Stage::Emitting);

        let stub = stages.check(glue::render_stub(
            &output.binary,
            self.inner.config.stub.payload,
        ))?;
        stages.advance();

        Ok(CompiledModule {
            binary: output.binary,
            dependencies: output.dependencies,
            stub,
        })
    }

    /// Run the pipeline for the host's resource and report through `ctx`
    ///
    /// Dependencies are registered only when the build succeeds. The context
    /// is completed exactly once.
    pub async fn run<C: BuildContext>(&self, mut ctx: C) {
        let source = ctx.resource_path().to_path_buf();
        tracing::info!("Building {}", source.display());

        match self.compile(&source).await {
            Ok(module) => {
                for dependency in &module.dependencies {
                    ctx.add_context_dependency(dependency);
                }
                tracing::info!(
                    "Built {} → {}",
                    source.display(),
                    module.binary.display()
                );
                ctx.complete(Ok(module.stub));
            }
            Err(err) => {
                tracing::warn!("Build of {} failed: {}", source.display(), err);
                ctx.complete(Err(err));
            }
        }
    }
}
