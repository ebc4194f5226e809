// ABOUTME: Stand-in for the ssh binary that runs the remote command locally.
// ABOUTME: Records each invocation's argv per target so tests can inspect it.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// Logs argv to `argv-<target>.log`, exports the target as `FAKE_SSH_TARGET`,
/// then runs everything after `--` through `sh -c` like sshd would.
const SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
target="$1"
printf '%s\n' "$@" > "$dir/argv-$target.log"
while [ "$#" -gt 0 ]; do
  if [ "$1" = "--" ]; then
    shift
    break
  fi
  shift
done
FAKE_SSH_TARGET="$target"
export FAKE_SSH_TARGET
exec sh -c "$*"
"#;

pub struct FakeSsh {
    dir: TempDir,
}

impl FakeSsh {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("ssh");
        fs::write(&program, SCRIPT).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn program(&self) -> String {
        self.dir.path().join("ssh").display().to_string()
    }

    fn log_path(&self, target: &str) -> PathBuf {
        self.dir.path().join(format!("argv-{target}.log"))
    }

    /// Arguments the fake received for `target`, excluding the program name.
    pub fn argv(&self, target: &str) -> Vec<String> {
        fs::read_to_string(self.log_path(target))
            .unwrap_or_else(|e| panic!("no ssh invocation recorded for {target}: {e}"))
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn was_called_for(&self, target: &str) -> bool {
        self.log_path(target).exists()
    }
}
