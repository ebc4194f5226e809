// ABOUTME: Spawns a child process and drives it to completion through the demultiplexer.
// ABOUTME: Shared by local and ssh execution; enforces timeouts by killing the child or its group.

use super::command::{CommandResult, RunOptions};
use super::demux::{Channel, Demultiplexer};
use super::error::{Error, Result};
use std::io::{self, IsTerminal};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, Command as ProcessCommand};
use tokio::time::Instant;
use tracing::Level;

/// A fully prepared process invocation.
#[derive(Debug)]
pub(crate) struct Invocation {
    pub argv: Vec<String>,
    /// What the user asked for, shown in stall warnings and soft failures.
    pub displayed: String,
    pub prefix: String,
    /// Environment overlay for the spawned process.
    pub env: Vec<(String, String)>,
}

/// Where a spawned child lives relative to the caller's terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessGroup {
    /// The caller's group. Children can prompt on `/dev/tty` (ssh host keys,
    /// passwords, passphrases) and receive the terminal's Ctrl-C. A timeout
    /// kills only the direct child.
    Inherit,
    /// A group of its own, so a timeout kills everything the child started.
    Isolated,
}

impl ProcessGroup {
    /// Inherit when attached to a terminal, isolate otherwise.
    pub(crate) fn detect() -> Self {
        Self::for_terminal(io::stdin().is_terminal() || io::stderr().is_terminal())
    }

    fn for_terminal(interactive: bool) -> Self {
        if interactive {
            ProcessGroup::Inherit
        } else {
            ProcessGroup::Isolated
        }
    }
}

pub(crate) async fn execute(invocation: Invocation, opts: &RunOptions) -> Result<CommandResult> {
    execute_in(invocation, opts, ProcessGroup::detect()).await
}

async fn execute_in(
    invocation: Invocation,
    opts: &RunOptions,
    group: ProcessGroup,
) -> Result<CommandResult> {
    let Invocation {
        argv,
        displayed,
        prefix,
        env,
    } = invocation;
    let (program, args) = argv.split_first().ok_or(Error::EmptyCommand)?;

    let mut command = ProcessCommand::new(program);
    command
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if group == ProcessGroup::Isolated {
        command.process_group(0);
    }
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }

    let start = Instant::now();
    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: program.clone(),
        source,
    })?;

    let mut demux = Demultiplexer::new(prefix.as_str(), displayed.as_str(), Arc::clone(&opts.sink))
        .stall_window(opts.stall_window)
        .timeout(opts.timeout)
        .started_at(start);
    if let Some(stdout) = child.stdout.take() {
        demux = demux.stream(stdout, Channel::Stdout, opts.stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        demux = demux.stream(stderr, Channel::Stderr, opts.stderr);
    }
    let output = demux.run().await;

    if output.timed_out {
        kill(&mut child, group).await;
        return Err(Error::CommandTimedOut {
            argv,
            elapsed: start.elapsed(),
        });
    }

    let status = match opts.timeout {
        Some(timeout) => {
            let remaining = timeout.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    kill(&mut child, group).await;
                    return Err(Error::CommandTimedOut {
                        argv,
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
        None => child.wait().await?,
    };

    let exit_code = exit_code(status);
    tracing::debug!(
        "{} exited with {} after {:?}",
        prefix,
        exit_code,
        start.elapsed()
    );

    if exit_code != 0 {
        if opts.check {
            return Err(Error::CommandFailed {
                argv,
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        opts.sink.line(
            &prefix,
            Level::WARN,
            &format!("[Command failed: {exit_code}] {displayed}"),
        );
    }

    Ok(CommandResult {
        argv,
        exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// Kill the child (and its group when isolated), then reap it.
async fn kill(child: &mut Child, group: ProcessGroup) {
    if group == ProcessGroup::Isolated {
        if let Some(pid) = child.id() {
            if let Err(e) = kill_group(pid) {
                tracing::debug!("killpg({}) failed: {}", pid, e);
            }
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!("failed to reap killed child: {}", e);
    }
}

/// SIGKILL every process in group `pgid`.
fn kill_group(pgid: u32) -> io::Result<()> {
    let pgid =
        libc::pid_t::try_from(pgid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: killpg(2) takes two integers and dereferences no memory. A stale
    // pgid only yields ESRCH.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
