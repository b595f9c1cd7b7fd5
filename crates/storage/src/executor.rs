//! Process execution seam
//!
//! Every volume primitive ends up as a shell command line. The executor is
//! the only place that touches processes, so tests swap it for a fake.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Failure to run a command line to a successful exit
#[derive(Error, Debug)]
pub enum ProcessFailure {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: String,
        stderr: String,
    },
}

impl ProcessFailure {
    /// Error text reported by the tool, or the spawn error
    pub fn message(&self) -> String {
        match self {
            ProcessFailure::Spawn { source, .. } => source.to_string(),
            ProcessFailure::Exit { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Synchronously runs a command line, optionally feeding it stdin
pub trait CommandExecutor: Send + Sync {
    /// Run `command_line` and return its stdout
    ///
    /// `input`, when present, is written to the process's stdin.
    fn execute(&self, command_line: &str, input: Option<&[u8]>) -> Result<Vec<u8>, ProcessFailure>;
}

/// Executor that runs command lines through `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command_line: &str, input: Option<&[u8]>) -> Result<Vec<u8>, ProcessFailure> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessFailure::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        // Feed stdin from a separate thread so a chatty child can't deadlock us
        let output = std::thread::scope(|s| {
            if let (Some(data), Some(mut stdin)) = (input, stdin) {
                s.spawn(move || {
                    if let Err(e) = stdin.write_all(data) {
                        debug!(error = %e, "Child closed stdin early");
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(|source| ProcessFailure::Spawn {
            command: command_line.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(ProcessFailure::Exit {
                command: command_line.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
