// ABOUTME: Command descriptions, per-call run options, and command results.
// ABOUTME: Also provides POSIX shell quoting for commands sent through ssh.

use super::demux::{OutputMode, STALL_WINDOW};
use super::sink::{OutputSink, TracingSink};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A command to execute, either as a shell snippet or as an argv vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interpreted by a shell (`sh -c` locally, `bash -c` remotely).
    Shell(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl Command {
    /// The command as it is shown in logs.
    pub fn display(&self) -> String {
        match self {
            Command::Shell(script) => script.clone(),
            Command::Argv(argv) => argv.join(" "),
        }
    }
}

impl From<&str> for Command {
    fn from(script: &str) -> Self {
        Command::Shell(script.to_string())
    }
}

impl From<String> for Command {
    fn from(script: String) -> Self {
        Command::Shell(script)
    }
}

impl From<Vec<String>> for Command {
    fn from(argv: Vec<String>) -> Self {
        Command::Argv(argv)
    }
}

impl From<&[&str]> for Command {
    fn from(argv: &[&str]) -> Self {
        Command::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(argv: [&str; N]) -> Self {
        Command::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

/// Options shared by local and remote execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stdout: OutputMode,
    pub stderr: OutputMode,
    /// Extra environment variables. Set on the local process for local runs,
    /// exported inside the remote shell for ssh runs.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Fail on a non-zero exit code (and, for groups, on any host failure).
    pub check: bool,
    /// Wall-clock limit for the whole command. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Prefix remote commands with `sudo --` unless connecting as root.
    pub become_root: bool,
    /// Pass `-v` to ssh.
    pub verbose_ssh: bool,
    pub stall_window: Duration,
    /// Program used in place of `ssh` when spawning remote commands.
    pub ssh_program: String,
    pub sink: Arc<dyn OutputSink>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stdout: OutputMode::Print,
            stderr: OutputMode::Print,
            env: Vec::new(),
            cwd: None,
            check: true,
            timeout: None,
            become_root: false,
            verbose_ssh: false,
            stall_window: STALL_WINDOW,
            ssh_program: "ssh".to_string(),
            sink: Arc::new(TracingSink),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_stdout(mut self) -> Self {
        self.stdout = OutputMode::Capture;
        self
    }

    pub fn capture_stderr(mut self) -> Self {
        self.stderr = OutputMode::Capture;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn become_root(mut self, become_root: bool) -> Self {
        self.become_root = become_root;
        self
    }

    pub fn verbose_ssh(mut self, verbose: bool) -> Self {
        self.verbose_ssh = verbose;
        self
    }

    pub fn stall_window(mut self, window: Duration) -> Self {
        self.stall_window = window;
        self
    }

    pub fn ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// Outcome of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// The argv that was actually spawned.
    pub argv: Vec<String>,
    /// Exit code; `128 + signal` if the process was killed by a signal.
    pub exit_code: i32,
    /// Captured stdout (empty unless stdout was captured).
    pub stdout: String,
    /// Captured stderr (empty unless stderr was captured).
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Quote a string so it survives one level of POSIX shell parsing.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
    });
    if safe {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
