// ABOUTME: Inventory scaffolding for new fleets.
// ABOUTME: Writes a commented fleet.yml template that parses as-is.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

const TEMPLATE: &str = r#"# fleetrun inventory
defaults:
  # strict | tofu | none
  host_key_check: strict
  # timeout: 10m
  # become_root: false
  # ssh_options:
  #   ConnectTimeout: "10"
  # env:
  #   DEPLOY_ENV: production
  #   API_TOKEN: { env: API_TOKEN }

machines:
  web1:
    # [user@]host[:port][?SshOption=value&...]
    target_host: root@web1.example.com
    # build_host: builder@build.example.com
    # identity_file: ~/.ssh/id_ed25519
  web2:
    target_host: root@web2.example.com:2222

groups:
  web: [web1, web2]
"#;

/// Write the template inventory into `dir`. Refuses to overwrite an
/// existing file unless `force` is set.
pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    tracing::debug!("wrote {}", config_path.display());
    Ok(())
}
