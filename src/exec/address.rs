// ABOUTME: Parser for compact deployment addresses.
// ABOUTME: Turns "[user@]host[:port][?opt=val&...]" into a Host named after its machine.

use super::error::{Error, Result};
use super::host::{Host, HostMeta};
use url::Url;

/// Parse a deployment address into a [`Host`] for `machine_name`.
///
/// Query options become `-o key=value` ssh options in the order given.
/// The host part is parsed as a URL authority, so bracketed IPv6 literals
/// work. The machine name becomes the command prefix and `meta.machine`.
pub fn parse_deployment_address(machine_name: &str, address: &str, meta: HostMeta) -> Result<Host> {
    let (user, rest) = match address.split_once('@') {
        Some((user, rest)) => {
            if user.is_empty() {
                return Err(Error::invalid_address(address, "user is empty"));
            }
            (Some(user), rest)
        }
        None => (None, address),
    };

    let (authority, query) = match rest.split_once('?') {
        Some((authority, query)) => (authority, Some(query)),
        None => (rest, None),
    };

    let mut options = Vec::new();
    for option in query.into_iter().flat_map(|q| q.split('&')) {
        if option.is_empty() {
            continue;
        }
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| Error::invalid_address(address, format!("option '{option}' is not key=value")))?;
        if key.is_empty() {
            return Err(Error::invalid_address(address, format!("option '{option}' has no key")));
        }
        options.push((key.to_string(), value.to_string()));
    }

    let (hostname, port) = parse_authority(address, authority)?;

    let mut host = Host::new(hostname).command_prefix(machine_name);
    if let Some(user) = user {
        host = host.user(user);
    }
    if let Some(port) = port {
        host = host.port(port);
    }
    for (key, value) in options {
        host = host.ssh_option(key, value);
    }

    let meta = HostMeta {
        machine: Some(machine_name.to_string()),
        ..meta
    };
    Ok(host.meta(meta))
}

fn parse_authority(address: &str, authority: &str) -> Result<(String, Option<u16>)> {
    if authority.is_empty() {
        return Err(Error::invalid_address(address, "hostname is empty"));
    }

    let url = Url::parse(&format!("ssh://{authority}"))
        .map_err(|e| Error::invalid_address(address, e.to_string()))?;

    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::invalid_address(address, "more than one '@'"));
    }
    if !url.path().is_empty() || url.fragment().is_some() {
        return Err(Error::invalid_address(address, "unexpected path after hostname"));
    }

    let hostname = match url.host() {
        Some(url::Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(url::Host::Ipv4(ip)) => ip.to_string(),
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    };
    if hostname.is_empty() {
        return Err(Error::invalid_address(address, "hostname is empty"));
    }

    Ok((hostname, url.port()))
}
