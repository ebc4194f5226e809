// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{ArgAction, Args, Parser, Subcommand};
use fleetrun::exec::{Command, RunOptions};
use fleetrun::output::OutputMode;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(about = "Run commands across a fleet of machines over ssh")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print failures and the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Inventory file (default: discover fleet.yml in the current directory)
    #[arg(short = 'f', long, global = true)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template fleet.yml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List machines and their ssh targets
    List,

    /// Run a command on the selected machines over ssh
    Run {
        #[command(flatten)]
        exec: ExecArgs,

        /// Run on each machine's build host instead of the machine itself
        #[arg(long)]
        build_host: bool,

        /// Pass -v to ssh
        #[arg(long)]
        verbose_ssh: bool,

        /// Program used in place of ssh
        #[arg(long, default_value = "ssh")]
        ssh_program: String,
    },

    /// Run a command locally once per selected machine
    Local {
        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Print the ssh command line used to reach a machine
    SshCommand {
        machine: String,

        /// Use the machine's build host
        #[arg(long)]
        build_host: bool,

        /// Include -v
        #[arg(long)]
        verbose_ssh: bool,
    },
}

#[derive(Args)]
pub struct ExecArgs {
    /// Machine to run on (repeatable)
    #[arg(short, long = "machine")]
    pub machines: Vec<String>,

    /// Group to run on (repeatable)
    #[arg(short, long = "group")]
    pub groups: Vec<String>,

    /// Kill the command after this long (e.g. 30s, 5m)
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Report non-zero exits as warnings instead of failing
    #[arg(long)]
    pub no_check: bool,

    /// Run through sudo unless already root
    #[arg(long)]
    pub become_root: bool,

    /// Extra environment variable KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Command to run. A single argument is run as a shell command.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ExecArgs {
    /// Layer the flags over the inventory defaults.
    pub fn apply(&self, mut opts: RunOptions) -> RunOptions {
        if let Some(timeout) = self.timeout {
            opts = opts.timeout(timeout);
        }
        if self.become_root {
            opts = opts.become_root(true);
        }
        for (key, value) in &self.env {
            opts = opts.env(key, value);
        }
        opts.check(!self.no_check)
    }

    pub fn command(&self) -> Command {
        match self.command.as_slice() {
            [script] => Command::Shell(script.clone()),
            argv => Command::Argv(argv.to_vec()),
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
