// ABOUTME: Fleet inventory parsing for fleet.yml.
// ABOUTME: Resolves machines and groups into Hosts, HostGroups, and RunOptions.

mod deserialize;
mod env_value;
mod init;

pub use env_value::{EnvValue, resolve_env};
pub use init::init_config;

use crate::error::{Error, Result};
use crate::exec::{Host, HostGroup, HostKeyCheck, HostMeta, RunOptions, parse_deployment_address};
use crate::types::MachineName;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "fleet.yml";
pub const CONFIG_FILENAME_ALT: &str = "fleet.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".fleet/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub machines: BTreeMap<MachineName, MachineConfig>,

    #[serde(default)]
    pub groups: BTreeMap<String, Vec<MachineName>>,
}

/// Settings applied to every machine unless the machine overrides them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub host_key_check: HostKeyCheck,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Extra `-o` options, in file order.
    #[serde(default, deserialize_with = "deserialize::deserialize_ordered_options")]
    pub ssh_options: Vec<(String, String)>,

    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub become_root: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// Deployment address of the machine itself.
    pub target_host: String,

    /// Where builds for this machine run, when not on the machine itself.
    #[serde(default)]
    pub build_host: Option<String>,

    #[serde(default)]
    pub identity_file: Option<PathBuf>,

    #[serde(default)]
    pub forward_agent: bool,

    #[serde(default)]
    pub host_key_check: Option<HostKeyCheck>,

    /// Extra `-o` options, in file order.
    #[serde(default, deserialize_with = "deserialize::deserialize_ordered_options")]
    pub ssh_options: Vec<(String, String)>,

    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("loading inventory from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        for (name, machine) in &self.machines {
            parse_deployment_address(name.as_str(), &machine.target_host, HostMeta::default())
                .map_err(|e| Error::InvalidConfig(format!("machine {name}: target_host: {e}")))?;
            if let Some(build_host) = &machine.build_host {
                parse_deployment_address(name.as_str(), build_host, HostMeta::default())
                    .map_err(|e| Error::InvalidConfig(format!("machine {name}: build_host: {e}")))?;
            }
        }
        for (group, members) in &self.groups {
            if let Some(missing) = members.iter().find(|m| !self.machines.contains_key(*m)) {
                return Err(Error::InvalidConfig(format!(
                    "group {group} references unknown machine {missing}"
                )));
            }
        }
        Ok(())
    }

    pub fn machine(&self, name: &str) -> Result<&MachineConfig> {
        MachineName::new(name)
            .ok()
            .and_then(|key| self.machines.get(&key))
            .ok_or_else(|| Error::UnknownMachine(name.to_string()))
    }

    /// The host a machine is deployed to.
    pub fn target_host(&self, name: &str) -> Result<Host> {
        let machine = self.machine(name)?;
        let meta = HostMeta {
            extra_args: machine.extra_args.clone(),
            ..HostMeta::default()
        };
        let host = parse_deployment_address(name, &machine.target_host, meta)?;
        Ok(self.apply_machine_settings(host, machine))
    }

    /// The host builds for a machine run on.
    ///
    /// Without a configured `build_host` this is the target host itself.
    /// Otherwise the build host forwards the local agent so it can reach the
    /// target, and carries the target in its metadata.
    pub fn build_host(&self, name: &str) -> Result<Host> {
        let machine = self.machine(name)?;
        let target = self.target_host(name)?;
        let Some(address) = &machine.build_host else {
            return Ok(target);
        };

        let meta = HostMeta {
            extra_args: machine.extra_args.clone(),
            target_host: Some(Box::new(target)),
            ..HostMeta::default()
        };
        let host = parse_deployment_address(name, address, meta)?;
        Ok(self.apply_machine_settings(host, machine).forward_agent(true))
    }

    // Address options come first so they win over inventory options in ssh.
    fn apply_machine_settings(&self, mut host: Host, machine: &MachineConfig) -> Host {
        host = host
            .host_key_check(machine.host_key_check.unwrap_or(self.defaults.host_key_check))
            .forward_agent(machine.forward_agent);
        if let Some(identity) = &machine.identity_file {
            host = host.identity_file(identity);
        }
        for (key, value) in &machine.ssh_options {
            host = host.ssh_option(key, value);
        }
        for (key, value) in &self.defaults.ssh_options {
            if !machine.ssh_options.iter().any(|(own, _)| own == key) {
                host = host.ssh_option(key, value);
            }
        }
        host
    }

    /// Resolve CLI machine and group selections into machine names.
    ///
    /// An empty selection means every machine. Order follows the selection,
    /// machines first, without duplicates.
    pub fn select(&self, machines: &[String], groups: &[String]) -> Result<Vec<MachineName>> {
        if machines.is_empty() && groups.is_empty() {
            return Ok(self.machines.keys().cloned().collect());
        }

        let mut selected: Vec<MachineName> = Vec::new();
        let mut add = |name: &MachineName| {
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        };

        for name in machines {
            let key = MachineName::new(name)
                .ok()
                .filter(|key| self.machines.contains_key(key))
                .ok_or_else(|| Error::UnknownMachine(name.clone()))?;
            add(&key);
        }
        for group in groups {
            let members = self
                .groups
                .get(group)
                .ok_or_else(|| Error::UnknownGroup(group.clone()))?;
            members.iter().for_each(&mut add);
        }
        Ok(selected)
    }

    /// Target hosts for the selected machines, in selection order.
    pub fn host_group(&self, selection: &[MachineName]) -> Result<HostGroup> {
        let hosts = selection
            .iter()
            .map(|name| self.target_host(name.as_str()))
            .collect::<Result<Vec<_>>>()?;
        Ok(HostGroup::new(hosts))
    }

    /// Build hosts for the selected machines, in selection order.
    pub fn build_host_group(&self, selection: &[MachineName]) -> Result<HostGroup> {
        let hosts = selection
            .iter()
            .map(|name| self.build_host(name.as_str()))
            .collect::<Result<Vec<_>>>()?;
        Ok(HostGroup::new(hosts))
    }

    /// Run options seeded from `defaults`, with env references resolved.
    pub fn run_options(&self) -> Result<RunOptions> {
        let mut opts = RunOptions::new().become_root(self.defaults.become_root);
        if let Some(timeout) = self.defaults.timeout {
            opts = opts.timeout(timeout);
        }
        for (key, value) in resolve_env(&self.defaults.env)? {
            opts = opts.env(key, value);
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVENTORY: &str = r#"
defaults:
  host_key_check: tofu
  timeout: 5m
  ssh_options:
    ConnectTimeout: "10"
  env:
    DEPLOY_ENV: production
machines:
  web1:
    target_host: root@web1.example.com
  web2:
    target_host: deploy@web2.example.com:2222?ControlMaster=no
    host_key_check: none
    ssh_options:
      ConnectTimeout: "3"
  db1:
    target_host: db1.internal
    build_host: builder@build.internal
    identity_file: ~/.ssh/fleet
    extra_args: ["--show-trace"]
groups:
  web: [web1, web2]
  all: [db1, web1, web2]
"#;

    fn config() -> Config {
        Config::from_yaml(INVENTORY).unwrap()
    }

    #[test]
    fn parses_inventory() {
        let config = config();
        assert_eq!(config.machines.len(), 3);
        assert_eq!(config.defaults.timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.defaults.host_key_check, HostKeyCheck::Tofu);
        assert_eq!(config.groups["web"].len(), 2);
    }

    #[test]
    fn empty_inventory_is_valid() {
        let config = Config::from_yaml("{}").unwrap();
        assert!(config.machines.is_empty());
        assert!(config.select(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn target_host_applies_defaults_and_overrides() {
        let config = config();

        let web1 = config.target_host("web1").unwrap();
        assert_eq!(web1.ssh_target(), "root@web1.example.com");
        assert_eq!(web1.prefix(), "web1");
        assert_eq!(web1.key_check(), HostKeyCheck::Tofu);
        assert_eq!(
            web1.ssh_options(),
            &[("ConnectTimeout".to_string(), "10".to_string())]
        );

        let web2 = config.target_host("web2").unwrap();
        assert_eq!(web2.port_number(), Some(2222));
        assert_eq!(web2.key_check(), HostKeyCheck::None);
        assert_eq!(
            web2.ssh_options(),
            &[
                ("ControlMaster".to_string(), "no".to_string()),
                ("ConnectTimeout".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn build_host_forwards_agent_and_carries_target() {
        let config = config();
        let build = config.build_host("db1").unwrap();
        assert_eq!(build.ssh_target(), "builder@build.internal");
        assert!(build.forwards_agent());
        assert_eq!(build.prefix(), "db1");
        assert_eq!(build.metadata().extra_args, vec!["--show-trace"]);
        let target = build.metadata().target_host.as_deref().unwrap();
        assert_eq!(target.deploy_target(), "root@db1.internal");
    }

    #[test]
    fn build_host_falls_back_to_target() {
        let config = config();
        assert_eq!(
            config.build_host("web1").unwrap(),
            config.target_host("web1").unwrap()
        );
    }

    #[test]
    fn unknown_machine_is_an_error() {
        let config = config();
        assert!(matches!(config.target_host("nope"), Err(Error::UnknownMachine(_))));
        assert!(matches!(config.machine("bad name"), Err(Error::UnknownMachine(_))));
    }

    #[test]
    fn select_defaults_to_every_machine() {
        let names: Vec<String> = config()
            .select(&[], &[])
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["db1", "web1", "web2"]);
    }

    #[test]
    fn select_merges_machines_and_groups_without_duplicates() {
        let names: Vec<String> = config()
            .select(&["web2".to_string()], &["all".to_string()])
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["web2", "db1", "web1"]);
    }

    #[test]
    fn select_rejects_unknown_names() {
        let config = config();
        assert!(matches!(
            config.select(&["ghost".to_string()], &[]),
            Err(Error::UnknownMachine(_))
        ));
        assert!(matches!(
            config.select(&[], &["ghosts".to_string()]),
            Err(Error::UnknownGroup(_))
        ));
    }

    #[test]
    fn host_group_keeps_selection_order() {
        let config = config();
        let selection = config.select(&[], &["web".to_string()]).unwrap();
        let group = config.host_group(&selection).unwrap();
        let prefixes: Vec<_> = group.iter().map(|h| h.prefix().to_string()).collect();
        assert_eq!(prefixes, vec!["web1", "web2"]);
    }

    #[test]
    fn run_options_from_defaults() {
        let opts = config().run_options().unwrap();
        assert_eq!(opts.timeout, Some(Duration::from_secs(300)));
        assert_eq!(
            opts.env,
            vec![("DEPLOY_ENV".to_string(), "production".to_string())]
        );
        assert!(opts.check);
        assert!(!opts.become_root);
    }

    #[test]
    fn rejects_bad_addresses_and_group_members() {
        let bad_address = "machines:\n  web1:\n    target_host: \"alice@\"\n";
        assert!(matches!(
            Config::from_yaml(bad_address),
            Err(Error::InvalidConfig(_))
        ));

        let bad_group = "machines:\n  web1:\n    target_host: web1\ngroups:\n  web: [web9]\n";
        assert!(matches!(
            Config::from_yaml(bad_group),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn ssh_options_keep_file_order() {
        let yaml = r#"
defaults:
  ssh_options:
    ServerAliveInterval: "30"
    BatchMode: "yes"
machines:
  web1:
    target_host: web1?User=ops
    ssh_options:
      Compression: "yes"
      ConnectTimeout: "5"
      BatchMode: "no"
"#;
        let host = Config::from_yaml(yaml).unwrap().target_host("web1").unwrap();
        let keys: Vec<&str> = host.ssh_options().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec!["User", "Compression", "ConnectTimeout", "BatchMode", "ServerAliveInterval"]
        );
        assert_eq!(host.ssh_options()[3].1, "no");
    }

    #[test]
    fn rejects_invalid_machine_names() {
        let yaml = "machines:\n  -web:\n    target_host: web1\n";
        assert!(matches!(Config::from_yaml(yaml), Err(Error::Yaml(_))));
    }
}
