//! Subprocess seam. Providers never spawn processes directly; they go through
//! [`Exec`] so tests can feed canned tool output.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;

/// Captured result of one finished process. A non-zero exit is not an error at
/// this level: `ping` reports total loss with exit status 1 and useful stdout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout of a successful run, or the exit status as an error.
    pub fn into_stdout(self, program: &str) -> Result<String, ProbeError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(ProbeError::ExitStatus {
                program: program.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub trait Exec: Send + Sync {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, ProbeError>>;
}

pub type SharedExec = Arc<dyn Exec>;

/// Real process execution via tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExec;

impl Exec for SystemExec {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, ProbeError>> {
        Box::pin(async move {
            debug!(program, ?args, "exec");
            let child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output();
            match tokio::time::timeout(timeout, child).await {
                Err(_) => Err(ProbeError::Timeout(timeout)),
                Ok(Err(e)) => Err(ProbeError::Spawn {
                    program: program.to_string(),
                    reason: e.to_string(),
                }),
                Ok(Ok(out)) => Ok(ExecOutput {
                    code: out.status.code(),
                    stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
                }),
            }
        })
    }
}

/// Canned outputs keyed by the full command line (`program arg1 arg2`).
/// Unknown command lines fail with [`ProbeError::Spawn`].
#[derive(Debug, Default)]
pub struct ScriptedExec {
    outputs: Mutex<HashMap<String, Result<ExecOutput, ProbeError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, cmdline: &str, result: Result<ExecOutput, ProbeError>) -> Self {
        if let Ok(mut m) = self.outputs.lock() {
            m.insert(cmdline.to_string(), result);
        }
        self
    }

    /// Shorthand for a successful run printing `stdout`.
    pub fn ok(self, cmdline: &str, stdout: &str) -> Self {
        self.on(cmdline, Ok(ExecOutput::ok(stdout)))
    }

    /// Command lines seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Exec for ScriptedExec {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<ExecOutput, ProbeError>> {
        Box::pin(async move {
            let mut line = program.to_string();
            for a in args {
                line.push(' ');
                line.push_str(a);
            }
            if let Ok(mut c) = self.calls.lock() {
                c.push(line.clone());
            }
            let found = self
                .outputs
                .lock()
                .ok()
                .and_then(|m| m.get(&line).cloned());
            found.unwrap_or_else(|| {
                Err(ProbeError::Spawn {
                    program: program.to_string(),
                    reason: format!("no scripted output for `{line}`"),
                })
            })
        })
    }
}

/// Convenience for `&[&str]` argument lists.
pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
