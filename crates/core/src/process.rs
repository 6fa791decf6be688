//! External process invocation.
//!
//! Every `git`, `hg` and converter call goes through [`CommandRunner`], so
//! the orchestration code can be driven by a recording double in tests. An
//! [`Invocation`] carries its own working directory and optional deadline;
//! nothing here touches the process-wide current directory.

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ProcessError;

/// Where a child's stdout/stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture both streams into the returned [`CommandOutput`].
    #[default]
    Capture,
    /// Pass both streams through to the operator's terminal.
    Inherit,
}

/// A single external command to run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub output: OutputMode,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            output: OutputMode::Capture,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run the command with `dir` as its working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the command if it has not exited after `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn inherit_output(mut self) -> Self {
        self.output = OutputMode::Inherit;
        self
    }

    /// Arguments as lossy UTF-8 strings, for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Human-readable command line, e.g. `git config --global user.name`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in self.args_lossy() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Result of a finished command. Streams are empty in [`OutputMode::Inherit`].
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    fn from_status(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Runs [`Invocation`]s.
///
/// `run` returns `Ok` for any command that started and exited, successful or
/// not; `Err` only for spawn failures and deadline expiry. Use
/// [`CommandRunner::run_checked`] to also treat a non-zero exit as an error.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send;

    fn run_checked(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<CommandOutput, ProcessError>> + Send {
        async move {
            let output = self.run(invocation).await?;
            if !output.success {
                let stderr = output.stderr_lossy();
                warn!(
                    cmd = %invocation.command_line(),
                    exit_code = ?output.exit_code,
                    %stderr,
                    "command failed"
                );
                return Err(ProcessError::Failed {
                    command: invocation.command_line(),
                    exit_code: output.exit_code,
                    stderr,
                });
            }
            Ok(output)
        }
    }
}

/// [`CommandRunner`] that spawns real child processes on the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        debug!(
            cmd = %invocation.command_line(),
            cwd = ?invocation.cwd,
            timeout = ?invocation.timeout,
            "running command"
        );

        let mode = invocation.output;
        let finished = async move {
            match mode {
                OutputMode::Capture => cmd.output().await.map(CommandOutput::from),
                OutputMode::Inherit => cmd.status().await.map(CommandOutput::from_status),
            }
        };

        let result = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, finished).await {
                Ok(result) => result,
                // Dropping the future drops the child, which kills it.
                Err(_) => {
                    warn!(cmd = %invocation.command_line(), ?limit, "command timed out");
                    return Err(ProcessError::TimedOut {
                        command: invocation.command_line(),
                        after: limit,
                    });
                }
            },
            None => finished.await,
        };

        result.map_err(|source| ProcessError::Spawn {
            command: invocation.command_line(),
            source,
        })
    }
}
