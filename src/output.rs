// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes for per-host results.

use crate::exec::{CommandResult, HostResult};
use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only failures and the final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print one inventory machine.
    pub fn machine(&self, name: &str, target: &str, build: Option<&str>) {
        match self.mode {
            OutputMode::Normal => match build {
                Some(build) => println!("{name}\t{target}\t(build: {build})"),
                None => println!("{name}\t{target}"),
            },
            OutputMode::Quiet => println!("{name}"),
            OutputMode::Json => print_json(&MachineEvent {
                event: "machine",
                name,
                target,
                build,
            }),
        }
    }

    /// Print the per-host outcome of a group run followed by a summary line.
    pub fn host_results(&self, results: &[HostResult<CommandResult>]) {
        for result in results {
            if let Some(line) = render_host_result(self.mode, result) {
                println!("{line}");
            }
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        let summary = summary_line(results.len(), failed);
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 && self.mode == OutputMode::Normal {
                    println!("{summary} ({:.1}s)", elapsed);
                } else {
                    println!("{summary}");
                }
            }
            OutputMode::Json => print_json(&SummaryEvent {
                event: "summary",
                hosts: results.len(),
                failed,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

fn print_json<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

fn summary_line(hosts: usize, failed: usize) -> String {
    let noun = if hosts == 1 { "host" } else { "hosts" };
    if failed == 0 {
        format!("{hosts} {noun} ok")
    } else {
        format!("{hosts} {noun}, {failed} failed")
    }
}

/// One line for a host's result, or `None` when the mode hides it.
fn render_host_result(mode: OutputMode, result: &HostResult<CommandResult>) -> Option<String> {
    let prefix = result.host().prefix();
    match (mode, result.result()) {
        (OutputMode::Normal, Ok(cmd)) => Some(format!("✓ {prefix} (exit {})", cmd.exit_code)),
        (OutputMode::Normal | OutputMode::Quiet, Err(e)) => Some(format!("✗ {prefix}: {e}")),
        (OutputMode::Quiet, Ok(_)) => None,
        (OutputMode::Json, outcome) => {
            let (exit_code, stdout, error) = match outcome {
                Ok(cmd) => (Some(cmd.exit_code), Some(cmd.stdout.as_str()), None),
                Err(e) => (e.exit_code(), None, Some(e.to_string())),
            };
            let event = HostEvent {
                event: "host",
                host: prefix,
                target: result.host().ssh_target(),
                ok: outcome.is_ok(),
                exit_code,
                stdout: stdout.filter(|s| !s.is_empty()),
                error,
            };
            serde_json::to_string(&event).ok()
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct HostEvent<'a> {
    event: &'a str,
    host: &'a str,
    target: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct SummaryEvent<'a> {
    event: &'a str,
    hosts: usize,
    failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct MachineEvent<'a> {
    event: &'a str,
    name: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<&'a str>,
}
