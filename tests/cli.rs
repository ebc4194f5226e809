// ABOUTME: Integration tests for the fleetrun CLI commands.
// ABOUTME: Validates help, init, list, ssh-command, and run against a fake ssh.

mod support;

use assert_cmd::Command;
use fleetrun::exec::quote;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use support::fake_ssh::FakeSsh;

const INVENTORY: &str = r#"
machines:
  web1:
    target_host: root@web1.lan
  web2:
    target_host: deploy@web2.lan:2222?ConnectTimeout=5
    build_host: builder@build.lan
groups:
  web: [web1, web2]
"#;

fn fleetrun_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fleetrun"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn inventory_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("fleet.yml"), INVENTORY).unwrap();
    dir
}

#[test]
fn help_shows_commands() {
    fleetrun_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("ssh-command"));
}

#[test]
fn init_creates_inventory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("fleet.yml");

    fleetrun_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .success();

    assert!(config_path.exists(), "fleet.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("machines:"));
}

#[test]
fn init_refuses_to_overwrite_existing_inventory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("fleet.yml");
    fs::write(&config_path, "machines: {}").unwrap();

    fleetrun_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    fleetrun_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn missing_inventory_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    fleetrun_cmd()
        .current_dir(temp_dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("inventory file not found"));
}

#[test]
fn list_shows_targets() {
    let dir = inventory_dir();
    fleetrun_cmd()
        .current_dir(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("web1\troot@web1.lan"))
        .stdout(predicate::str::contains("(build: builder@build.lan)"));
}

#[test]
fn list_as_json() {
    let dir = inventory_dir();
    let output = fleetrun_cmd()
        .current_dir(dir.path())
        .args(["list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["name"], "web2");
    assert_eq!(lines[1]["target"], "deploy@web2.lan");
}

#[test]
fn ssh_command_prints_argv() {
    let dir = inventory_dir();
    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["ssh-command", "web2"])
        .assert()
        .success()
        .stdout("ssh deploy@web2.lan -o ConnectTimeout=5 -p 2222\n");
}

#[test]
fn ssh_command_for_build_host_forwards_agent() {
    let dir = inventory_dir();
    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["ssh-command", "web2", "--build-host", "--verbose-ssh"])
        .assert()
        .success()
        .stdout("ssh builder@build.lan -A -v\n");
}

#[test]
fn unknown_machine_fails() {
    let dir = inventory_dir();
    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["ssh-command", "web9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown machine: web9"));
}

#[test]
fn run_prints_prefixed_output_and_summary() {
    let dir = inventory_dir();
    let ssh = FakeSsh::new();

    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["run", "-g", "web", "--ssh-program", &ssh.program(), "--", "echo", "hello"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[web1] hello"))
        .stderr(predicate::str::contains("[web2] hello"))
        .stdout(predicate::str::contains("✓ web1 (exit 0)"))
        .stdout(predicate::str::contains("2 hosts ok"));

    assert!(ssh.was_called_for("root@web1.lan"));
    assert!(ssh.was_called_for("deploy@web2.lan"));
}

#[test]
fn run_fails_when_a_host_fails() {
    let dir = inventory_dir();
    let ssh = FakeSsh::new();

    fleetrun_cmd()
        .current_dir(dir.path())
        .args([
            "run",
            "--ssh-program",
            &ssh.program(),
            "test \"$FAKE_SSH_TARGET\" = root@web1.lan",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[web2] command ["))
        .stderr(predicate::str::contains("[web2] failed with:"))
        .stderr(predicate::str::contains("1 hosts failed with an error"))
        .stdout(predicate::str::contains("2 hosts, 1 failed"));
}

#[test]
fn run_with_no_check_succeeds_with_warning() {
    let dir = inventory_dir();
    let ssh = FakeSsh::new();

    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["run", "-m", "web2", "--no-check", "--ssh-program", &ssh.program(), "exit 4"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[web2] [Command failed: 4] exit 4"));
}

#[test]
fn run_json_captures_stdout() {
    let dir = inventory_dir();
    let ssh = FakeSsh::new();

    let output = fleetrun_cmd()
        .current_dir(dir.path())
        .args(["run", "-m", "web1", "--json", "--ssh-program", &ssh.program(), "echo", "hi"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events[0]["event"], "host");
    assert_eq!(events[0]["host"], "web1");
    assert_eq!(events[0]["stdout"], "hi\n");
    assert_eq!(events[1]["event"], "summary");
    assert_eq!(events[1]["failed"], 0);
}

#[test]
fn local_runs_once_per_machine() {
    let dir = inventory_dir();

    fleetrun_cmd()
        .current_dir(dir.path())
        .args(["local", "-g", "web", "echo local-$((1+1))"])
        .assert()
        .success()
        .stderr(predicate::str::contains("[web1] local-2"))
        .stderr(predicate::str::contains("[web2] local-2"));
}

#[test]
fn explicit_inventory_file() {
    let dir = inventory_dir();
    let elsewhere = tempfile::tempdir().unwrap();
    fleetrun_cmd()
        .current_dir(elsewhere.path())
        .args(["list", "-f"])
        .arg(dir.path().join("fleet.yml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("web2"));
}

fn script_available() -> bool {
    std::process::Command::new("script")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Test: Run a command that prompts on /dev/tty from inside a terminal.
/// Expected: the answer typed into the terminal reaches the command.
#[test]
fn local_command_can_prompt_on_the_terminal() {
    if !script_available() {
        eprintln!("script(1) not available, skipping");
        return;
    }
    let dir = inventory_dir();
    let inventory = dir.path().join("fleet.yml").display().to_string();
    let inner: Vec<String> = [
        env!("CARGO_BIN_EXE_fleetrun"),
        "-f",
        inventory.as_str(),
        "local",
        "-m",
        "web1",
        "--timeout",
        "10s",
        "read x < /dev/tty; echo got:$x",
    ]
    .iter()
    .map(|arg| quote(arg))
    .collect();

    Command::new("script")
        .args(["-qec", &inner.join(" "), "/dev/null"])
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .write_stdin("yes\n")
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("[web1] got:yes"));
}
