//! Shell process execution
//!
//! Runs one resolved command line in a strict-mode shell and collects its
//! output. The [`ProcessRunner`] trait is the seam the engine drives, so
//! tests can substitute a scripted runner and assert on the exact requests
//! without spawning processes.

use crate::core::node::Shell;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// One line of process output, tagged with its stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(s) | OutputLine::Stderr(s) => s,
        }
    }
}

/// A fully resolved command, ready to hand to a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub shell: Shell,
    pub command: String,
    pub working_directory: PathBuf,
    /// The complete environment for the child; nothing else is inherited
    pub env: BTreeMap<String, String>,
}

/// Outcome of a process run
///
/// A failure to launch is folded into a normal outcome with exit code 1, so
/// callers handle exactly one shape.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub lines: Vec<OutputLine>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout lines only, in arrival order
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| match line {
            OutputLine::Stdout(s) => Some(s.as_str()),
            OutputLine::Stderr(_) => None,
        })
    }
}

/// Executes resolved commands
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: ProcessRequest) -> ProcessOutput;
}

/// Real runner backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, request: ProcessRequest) -> ProcessOutput {
        let tokens = request.shell.command_tokens(&request.command);
        debug!("spawning {:?} in {:?}", tokens, request.working_directory);

        let mut command = Command::new(&tokens[0]);
        command
            .args(&tokens[1..])
            .current_dir(&request.working_directory)
            .env_clear()
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to spawn shell process: {}", e);
                return ProcessOutput {
                    exit_code: 1,
                    lines: vec![OutputLine::Stderr(e.to_string())],
                };
            }
        };

        // Both pipes are drained concurrently with the wait so a chatty
        // child cannot deadlock on a full pipe buffer
        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let status = child.wait().await;
        let stdout_lines = stdout_task.await.unwrap_or_default();
        let stderr_lines = stderr_task.await.unwrap_or_default();

        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(1),
            Err(e) => {
                warn!("failed to wait for shell process: {}", e);
                1
            }
        };

        let mut lines: Vec<OutputLine> =
            stdout_lines.into_iter().map(OutputLine::Stdout).collect();
        lines.extend(stderr_lines.into_iter().map(OutputLine::Stderr));

        ProcessOutput { exit_code, lines }
    }
}

async fn drain<R: AsyncRead + Unpin + Send + 'static>(reader: Option<R>) -> Vec<String> {
    let Some(reader) = reader else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    let mut reader = BufReader::new(reader).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        lines.push(line);
    }
    lines
}
