//! External tool invocation
//!
//! Every compiler, build tool and post-processor run goes through a
//! [`ToolRunner`]. The system runner captures stderr only, honours a
//! per-run timeout, and kills the child when the pipeline is cancelled.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;

use rustwasm_core::{Error, Result};

/// A single external process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable name or path
    pub program: String,

    /// Argument vector, excluding the program
    pub args: Vec<OsString>,

    /// Environment variables removed from the inherited environment
    pub env_remove: Vec<String>,
}

impl ToolInvocation {
    /// Start an invocation of `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_remove: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Append `<flag><value>` as a single argument, e.g. `--manifest-path=<path>`
    pub fn joined_arg(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        let mut arg = OsString::from(flag);
        arg.push(value.as_ref());
        self.arg(arg)
    }

    /// Do not pass `key` through to the child
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Cancellation signal shared by every tool run of a pipeline
///
/// Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// A fresh, untripped token
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the token, stopping every run observing it
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`CancelToken::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is tripped
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender is owned by `self`, so this only happens during teardown
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs external tools
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` to completion
    ///
    /// Succeeds only on a zero exit status.
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<()>;
}

/// Runs tools as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    /// Create a runner that kills tools running longer than `timeout`
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<()> {
        let tool = invocation.program.clone();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { tool });
        }

        tracing::debug!("Running {}", invocation);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &invocation.env_remove {
            command.env_remove(key);
        }

        let child = command.spawn().map_err(|e| Error::ToolInvocation {
            tool: tool.clone(),
            status: None,
            stderr: format!("failed to start: {}", e),
        })?;

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| Error::ToolInvocation {
                tool: tool.clone(),
                status: None,
                stderr: format!("failed to wait for process: {}", e),
            })?,
            _ = expire(self.timeout) => {
                tracing::warn!("{} exceeded its time limit, killing it", tool);
                return Err(Error::ToolTimeout {
                    tool,
                    after: self.timeout.unwrap_or_default(),
                });
            }
            _ = cancel.cancelled() => {
                tracing::warn!("{} cancelled, killing it", tool);
                return Err(Error::Cancelled { tool });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::warn!(
                "{} failed with status {:?}",
                tool,
                output.status.code()
            );
            return Err(Error::ToolInvocation {
                tool,
                status: output.status.code(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            tracing::debug!(stderr = %stderr, "{} stderr", tool);
        }

        Ok(())
    }
}

async fn expire(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

/// A runner bound to the cancellation token of one pipeline
#[derive(Clone)]
pub struct Tools {
    runner: Arc<dyn ToolRunner>,
    cancel: CancelToken,
}

impl Tools {
    /// Bind `runner` to `cancel`
    pub fn new(runner: Arc<dyn ToolRunner>, cancel: CancelToken) -> Self {
        Self { runner, cancel }
    }

    /// Run one invocation
    pub async fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        self.runner.run(invocation, &self.cancel).await
    }

    /// The token runs observe
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolInvocation {
        ToolInvocation::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_invocation_display() {
        let invocation = ToolInvocation::new("cargo")
            .arg("build")
            .joined_arg("--manifest-path=", "/work/Cargo.toml")
            .args(["--release"]);
        assert_eq!(
            invocation.to_string(),
            "cargo build --manifest-path=/work/Cargo.toml --release"
        );
    }

    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let runner = SystemRunner::new(None);
        runner
            .run(&sh("echo warning: unused >&2; exit 0"), &CancelToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let runner = SystemRunner::new(None);
        let err = runner
            .run(
                &sh("echo first >&2; echo second >&2; exit 3"),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            Error::ToolInvocation {
                tool,
                status,
                stderr,
            } => {
                assert_eq!(tool, "sh");
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "first\nsecond\n");
            }
            other => panic!("Expected ToolInvocation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_executable_has_no_status() {
        let runner = SystemRunner::new(None);
        let err = runner
            .run(
                &ToolInvocation::new("rustwasm-definitely-not-installed"),
                &CancelToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::ToolInvocation { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let runner = SystemRunner::new(Some(Duration::from_millis(100)));
        let err = runner
            .run(&sh("sleep 10"), &CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ToolTimeout { .. }));
    }

    #[tokio::test]
    async fn test_cancel_stops_running_tool() {
        let runner = SystemRunner::new(None);
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = runner.run(&sh("sleep 10"), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let err = SystemRunner::new(None)
            .run(&ToolInvocation::new("rustwasm-definitely-not-installed"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_env_remove_hides_variable() {
        let runner = SystemRunner::new(None);
        let invocation = sh("test -z \"$HOME\"").env_remove("HOME");
        runner.run(&invocation, &CancelToken::new()).await.unwrap();
    }
}
