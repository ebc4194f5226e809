// ABOUTME: Immutable description of an execution target and its run operations.
// ABOUTME: Builds the ssh argv and the remote bash wrapper; local runs spawn directly.

use super::command::{Command, CommandResult, RunOptions, quote};
use super::error::{Error, Result};
use super::process::{Invocation, execute};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

/// How strictly ssh verifies the remote host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKeyCheck {
    /// ssh's default verification: unknown or changed keys fail.
    #[default]
    Strict,
    /// Accept unknown keys and remember them.
    Tofu,
    /// Accept any key and remember nothing.
    None,
}

impl fmt::Display for HostKeyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostKeyCheck::Strict => "strict",
            HostKeyCheck::Tofu => "tofu",
            HostKeyCheck::None => "none",
        };
        write!(f, "{s}")
    }
}

impl FromStr for HostKeyCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(HostKeyCheck::Strict),
            "tofu" => Ok(HostKeyCheck::Tofu),
            "none" => Ok(HostKeyCheck::None),
            other => Err(format!(
                "invalid host key check '{other}' (expected strict, tofu or none)"
            )),
        }
    }
}

/// Caller context attached to a host. Carried along, never interpreted by
/// the execution engine itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostMeta {
    /// Inventory name of the machine this host belongs to.
    pub machine: Option<String>,
    /// Final deployment target when this host is a build host reached first.
    pub target_host: Option<Box<Host>>,
    /// Extra arguments for the deployment command run on this host.
    pub extra_args: Vec<String>,
}

/// A local or ssh-reachable execution target.
///
/// A `Host` holds no connection; every run spawns a fresh process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    identity_file: Option<PathBuf>,
    forward_agent: bool,
    command_prefix: String,
    host_key_check: HostKeyCheck,
    ssh_options: Vec<(String, String)>,
    meta: HostMeta,
    verbose_ssh: bool,
}

impl Host {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            command_prefix: host.clone(),
            host,
            user: None,
            port: None,
            identity_file: None,
            forward_agent: false,
            host_key_check: HostKeyCheck::Strict,
            ssh_options: Vec::new(),
            meta: HostMeta::default(),
            verbose_ssh: false,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn forward_agent(mut self, forward: bool) -> Self {
        self.forward_agent = forward;
        self
    }

    /// Label put in front of every output line. An empty prefix falls back
    /// to the hostname.
    pub fn command_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.command_prefix = if prefix.is_empty() {
            self.host.clone()
        } else {
            prefix
        };
        self
    }

    pub fn host_key_check(mut self, check: HostKeyCheck) -> Self {
        self.host_key_check = check;
        self
    }

    /// Append a raw `-o key=value` ssh option. Later options are passed later.
    pub fn ssh_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ssh_options.push((key.into(), value.into()));
        self
    }

    pub fn meta(mut self, meta: HostMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn verbose_ssh(mut self, verbose: bool) -> Self {
        self.verbose_ssh = verbose;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn port_number(&self) -> Option<u16> {
        self.port
    }

    pub fn identity_path(&self) -> Option<&Path> {
        self.identity_file.as_deref()
    }

    pub fn forwards_agent(&self) -> bool {
        self.forward_agent
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn key_check(&self) -> HostKeyCheck {
        self.host_key_check
    }

    pub fn ssh_options(&self) -> &[(String, String)] {
        &self.ssh_options
    }

    pub fn metadata(&self) -> &HostMeta {
        &self.meta
    }

    /// `user@host`, or just `host` when no user is set.
    pub fn ssh_target(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// `user@host` with `root` standing in for a missing user, as expected
    /// by tools that take a deployment target.
    pub fn deploy_target(&self) -> String {
        format!("{}@{}", self.user.as_deref().unwrap_or("root"), self.host)
    }

    /// The ssh argv (without the remote command) used to reach this host.
    pub fn ssh_command_line(&self, verbose: bool) -> Vec<String> {
        let mut argv = vec!["ssh".to_string(), self.ssh_target()];

        if self.forward_agent {
            argv.push("-A".to_string());
        }
        for (key, value) in &self.ssh_options {
            argv.push("-o".to_string());
            argv.push(format!("{key}={}", quote(value)));
        }
        if let Some(port) = self.port {
            argv.push("-p".to_string());
            argv.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            argv.push("-i".to_string());
            argv.push(identity.display().to_string());
        }
        if self.host_key_check != HostKeyCheck::Strict {
            argv.push("-o".to_string());
            argv.push("StrictHostKeyChecking=no".to_string());
        }
        if self.host_key_check == HostKeyCheck::None {
            argv.push("-o".to_string());
            argv.push("UserKnownHostsFile=/dev/null".to_string());
        }
        if verbose || self.verbose_ssh {
            argv.push("-v".to_string());
        }
        argv
    }

    /// Build the single string handed to ssh as the remote command, and the
    /// form of it shown in logs.
    pub(crate) fn remote_command(&self, cmd: &Command, opts: &RunOptions) -> (String, String) {
        let sudo = if opts.become_root && self.user.as_deref() != Some("root") {
            "sudo -- "
        } else {
            ""
        };

        let export = if opts.env.is_empty() {
            String::new()
        } else {
            let assignments: Vec<String> = opts
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", quote(k), quote(v)))
                .collect();
            format!("export {}; ", assignments.join(" "))
        };

        let displayed = format!("{export}{}", cmd.display());

        let (script, args) = match cmd {
            Command::Shell(script) => (format!("{export}{script}"), Vec::new()),
            Command::Argv(argv) => (
                format!("{export}exec \"$@\""),
                argv.iter().map(|a| quote(a)).collect(),
            ),
        };

        let mut remote = format!("{sudo}bash -c {} --", quote(&script));
        if !args.is_empty() {
            remote.push(' ');
            remote.push_str(&args.join(" "));
        }
        (remote, displayed)
    }

    /// Run a command on the local machine on behalf of this host.
    ///
    /// Shell commands go through `sh -c`; argv commands are spawned directly.
    /// `opts.env` is overlaid on the inherited environment.
    pub async fn run_local(
        &self,
        cmd: impl Into<Command>,
        opts: &RunOptions,
    ) -> Result<CommandResult> {
        let cmd = cmd.into();
        let displayed = cmd.display();
        let argv = match cmd {
            Command::Shell(script) => vec!["sh".to_string(), "-c".to_string(), script],
            Command::Argv(argv) if argv.is_empty() => return Err(Error::EmptyCommand),
            Command::Argv(argv) => argv,
        };

        opts.sink
            .line(&self.command_prefix, Level::INFO, &format!("$ {displayed}"));

        execute(
            Invocation {
                argv,
                displayed,
                prefix: self.command_prefix.clone(),
                env: opts.env.clone(),
            },
            opts,
        )
        .await
    }

    /// Run a command on this host over ssh.
    pub async fn run(&self, cmd: impl Into<Command>, opts: &RunOptions) -> Result<CommandResult> {
        let cmd = cmd.into();
        if matches!(&cmd, Command::Argv(argv) if argv.is_empty()) {
            return Err(Error::EmptyCommand);
        }
        let (remote, displayed) = self.remote_command(&cmd, opts);

        opts.sink
            .line(&self.command_prefix, Level::INFO, &format!("$ {displayed}"));

        let mut argv = self.ssh_command_line(opts.verbose_ssh);
        argv[0] = opts.ssh_program.clone();
        argv.push("--".to_string());
        argv.push(remote);

        execute(
            Invocation {
                argv,
                displayed,
                prefix: self.command_prefix.clone(),
                env: Vec::new(),
            },
            opts,
        )
        .await
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ssh_target())?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}
