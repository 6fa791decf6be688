//! Test double for [`CommandRunner`].
//!
//! [`RecordingRunner`] records every invocation and answers from scripted
//! rules, so the converter and walker can be exercised without `git`, `hg` or
//! `hg-fast-export.sh` installed. Unmatched invocations succeed with empty
//! output.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::ProcessError;
use crate::process::{CommandOutput, CommandRunner, Invocation, OutputMode};

/// One invocation as seen by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub output: OutputMode,
}

impl RecordedCall {
    /// `true` if the arguments start with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Program and arguments joined by spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The value following `flag`, if any.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }
}

/// Scripted answer to a matched invocation.
#[derive(Debug, Clone)]
pub enum Response {
    /// Exit 0 with the given stdout.
    Success(Vec<u8>),
    /// Exit with `code` and the given stderr.
    Failure { code: i32, stderr: String },
    /// Behave as if the deadline expired.
    Timeout,
    /// Behave as if the binary could not be started.
    SpawnError,
    /// Never finish; only a caller-side deadline ends the call.
    Hang,
}

impl Response {
    pub fn stdout(text: &str) -> Self {
        Self::Success(text.as_bytes().to_vec())
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Failure {
            code,
            stderr: stderr.into(),
        }
    }
}

type Rule = Box<dyn Fn(&RecordedCall) -> Option<Response> + Send + Sync>;

/// Recording, scriptable [`CommandRunner`].
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    rules: Mutex<Vec<Rule>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Rules are consulted in insertion order; the first one that
    /// returns `Some` decides the response.
    pub fn on<F>(&self, rule: F) -> &Self
    where
        F: Fn(&RecordedCall) -> Option<Response> + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .expect("rules lock poisoned")
            .push(Box::new(rule));
        self
    }

    /// Answer every invocation of `program` whose arguments start with
    /// `prefix` with `response`.
    pub fn respond(&self, program: &str, prefix: &[&str], response: Response) -> &Self {
        let program = program.to_string();
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        self.on(move |call| {
            let refs: Vec<&str> = prefix.iter().map(String::as_str).collect();
            (call.program == program && call.starts_with(&refs)).then(|| response.clone())
        })
    }

    /// Snapshot of all invocations so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// All invocations rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::command_line).collect()
    }

    fn respond_to(&self, call: &RecordedCall) -> Option<Response> {
        let rules = self.rules.lock().expect("rules lock poisoned");
        rules.iter().find_map(|rule| rule(call))
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        let call = RecordedCall {
            program: invocation.program.clone(),
            args: invocation.args_lossy(),
            cwd: invocation.cwd.clone(),
            timeout: invocation.timeout,
            output: invocation.output,
        };
        let response = self.respond_to(&call);
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(call);

        match response.unwrap_or(Response::Success(Vec::new())) {
            Response::Success(stdout) => Ok(CommandOutput {
                success: true,
                exit_code: Some(0),
                stdout,
                stderr: Vec::new(),
            }),
            Response::Failure { code, stderr } => Ok(CommandOutput {
                success: false,
                exit_code: Some(code),
                stdout: Vec::new(),
                stderr: stderr.into_bytes(),
            }),
            Response::Timeout => Err(ProcessError::TimedOut {
                command: invocation.command_line(),
                after: invocation.timeout.unwrap_or_default(),
            }),
            Response::SpawnError => Err(ProcessError::Spawn {
                command: invocation.command_line(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Response::Hang => std::future::pending().await,
        }
    }
}
