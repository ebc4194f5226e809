// ABOUTME: Entry point for the fleetrun CLI application.
// ABOUTME: Parses arguments, loads the inventory, and dispatches to the execution engine.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, ExecArgs};
use fleetrun::config::{self, Config};
use fleetrun::error::Result;
use fleetrun::exec::{Host, HostGroup, check_results, quote};
use fleetrun::logging;
use fleetrun::output::{Output, OutputMode};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut output = Output::new(cli.output_mode());
    if let Err(e) = run(cli, &mut output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &mut Output) -> Result<()> {
    let file = cli.file.as_deref();
    match cli.command {
        Commands::Init { force } => {
            let dir = env::current_dir()?;
            config::init_config(&dir, force)?;
            output.progress(&format!("Wrote {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::List => {
            let config = load_config(file)?;
            for (name, machine) in &config.machines {
                let target = config.target_host(name.as_str())?.ssh_target();
                let build = match &machine.build_host {
                    Some(_) => Some(config.build_host(name.as_str())?.ssh_target()),
                    None => None,
                };
                output.machine(name.as_str(), &target, build.as_deref());
            }
            Ok(())
        }
        Commands::Run {
            exec,
            build_host,
            verbose_ssh,
            ssh_program,
        } => {
            let config = load_config(file)?;
            let selection = config.select(&exec.machines, &exec.groups)?;
            let group = if build_host {
                config.build_host_group(&selection)?
            } else {
                config.host_group(&selection)?
            };
            let opts = exec
                .apply(config.run_options()?)
                .verbose_ssh(verbose_ssh)
                .ssh_program(ssh_program);
            run_on_group(group, &exec, opts, output, Target::Remote).await
        }
        Commands::Local { exec } => {
            let config = load_config(file)?;
            let selection = config.select(&exec.machines, &exec.groups)?;
            let group = config.host_group(&selection)?;
            let opts = exec.apply(config.run_options()?);
            run_on_group(group, &exec, opts, output, Target::Local).await
        }
        Commands::SshCommand {
            machine,
            build_host,
            verbose_ssh,
        } => {
            let config = load_config(file)?;
            let host = if build_host {
                config.build_host(&machine)?
            } else {
                config.target_host(&machine)?
            };
            let argv = host.ssh_command_line(verbose_ssh);
            let line: Vec<String> = argv.iter().map(|arg| quote(arg)).collect();
            println!("{}", line.join(" "));
            Ok(())
        }
    }
}

fn load_config(file: Option<&Path>) -> Result<Config> {
    match file {
        Some(path) => Config::load(path),
        None => Config::discover(&env::current_dir()?),
    }
}

#[derive(Clone, Copy)]
enum Target {
    Remote,
    Local,
}

/// Run on every host, print the per-host summary, then fail if any host did
/// and checking is on.
async fn run_on_group(
    group: HostGroup,
    exec: &ExecArgs,
    mut opts: fleetrun::exec::RunOptions,
    output: &mut Output,
    target: Target,
) -> Result<()> {
    if output.mode() == OutputMode::Json {
        opts = opts.capture_stdout();
    }
    let check = opts.check;
    let cmd = exec.command();

    output.start_timer();
    let results = group
        .run_function(
            move |host: Host| {
                let cmd = cmd.clone();
                let opts = opts.clone();
                async move {
                    match target {
                        Target::Remote => host.run(cmd, &opts).await,
                        Target::Local => host.run_local(cmd, &opts).await,
                    }
                }
            },
            false,
        )
        .await?;
    output.host_results(&results);

    if check {
        check_results(&results)?;
    }
    Ok(())
}
