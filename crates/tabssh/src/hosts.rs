//! Saved host list.
//!
//! Location: `~/.config/tabssh/hosts.toml`
//!
//! ```toml
//! [[hosts]]
//! id = "web-1"
//! name = "Web 1"
//! hostname = "web-1.example.com"
//! username = "deploy"
//! key-path = "~/.ssh/id_ed25519"
//! startup-command = "cd /srv/app"
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use session::HostStore;
use ssh::{Credential, HostDescriptor};
use std::fmt;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};

/// Password for ad-hoc targets when no identity file is given.
pub const PASSWORD_ENV: &str = "TABSSH_PASSWORD";

/// Identity files tried, in order, for ad-hoc targets.
const DEFAULT_IDENTITIES: &[&str] = &[".ssh/id_ed25519", ".ssh/id_ecdsa", ".ssh/id_rsa"];

/// One `[[hosts]]` entry.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HostEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub startup_command: Option<String>,
    /// RFC 3339, written back after each successful connect.
    #[serde(default)]
    pub last_connected: Option<String>,
}

impl fmt::Debug for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEntry")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_path", &self.key_path)
            .field("last_connected", &self.last_connected)
            .finish_non_exhaustive()
    }
}

impl HostEntry {
    /// Build a connection descriptor. Key auth wins over password auth.
    pub fn to_descriptor(&self, default_port: u16) -> Result<HostDescriptor> {
        let credential = match (&self.key_path, &self.password) {
            (Some(path), _) => Credential::Key {
                path: expand_home(path),
                passphrase: self.passphrase.clone(),
            },
            (None, Some(password)) => Credential::Password(password.clone()),
            (None, None) => bail!("host '{}' has neither key-path nor password", self.id),
        };

        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut host = HostDescriptor::new(&self.hostname, &self.username, credential)
            .with_port(self.port.unwrap_or(default_port))
            .with_name(&self.id, name);
        if let Some(command) = &self.startup_command {
            host = host.with_startup_command(command);
        }
        host.last_connected = self
            .last_connected
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(host)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HostsFile {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

impl HostsFile {
    pub fn find(&self, target: &str) -> Option<&HostEntry> {
        self.hosts
            .iter()
            .find(|h| h.id == target)
            .or_else(|| self.hosts.iter().find(|h| h.name.as_deref() == Some(target)))
    }
}

/// Load the host list. A missing file is an empty list.
pub fn load_hosts(path: &Path) -> Result<HostsFile> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HostsFile::default()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read hosts file: {:?}", path)),
    };
    toml::from_str(&content).with_context(|| format!("Failed to parse hosts file: {:?}", path))
}

/// Resolve a command-line target: a saved host id or name, else
/// `[user@]host[:port]`.
pub fn resolve_target(
    target: &str,
    hosts: &HostsFile,
    identity: Option<&Path>,
    default_port: u16,
) -> Result<HostDescriptor> {
    if let Some(entry) = hosts.find(target) {
        return entry.to_descriptor(default_port);
    }

    let (username, rest) = match target.split_once('@') {
        Some((user, rest)) if !user.is_empty() => (user.to_string(), rest),
        Some(_) => bail!("empty user name in target '{target}'"),
        None => (
            std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
            target,
        ),
    };
    let (hostname, port) = split_host_port(rest, default_port)
        .with_context(|| format!("invalid target '{target}'"))?;
    if hostname.is_empty() {
        bail!("empty host name in target '{target}'");
    }

    let credential = adhoc_credential(identity)
        .with_context(|| format!("no credentials for '{target}'"))?;
    Ok(HostDescriptor::new(hostname, username, credential).with_port(port))
}

/// Split `host[:port]` or `[ipv6][:port]`. A bare IPv6 address takes the
/// default port.
fn split_host_port(rest: &str, default_port: u16) -> Result<(&str, u16)> {
    if let Some(bracketed) = rest.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .context("missing ']' after IPv6 address")?;
        let port = match after {
            "" => default_port,
            _ => parse_port(after.strip_prefix(':').context("expected ':' after ']'")?)?,
        };
        return Ok((host, port));
    }

    match rest.split_once(':') {
        None => Ok((rest, default_port)),
        Some((host, port)) if !port.contains(':') => Ok((host, parse_port(port)?)),
        Some(_) => {
            if rest.parse::<Ipv6Addr>().is_err() {
                bail!("'{rest}' is not a host name or IPv6 address; use [address]:port");
            }
            Ok((rest, default_port))
        }
    }
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>().with_context(|| format!("invalid port '{port}'"))
}

fn adhoc_credential(identity: Option<&Path>) -> Result<Credential> {
    if let Some(path) = identity {
        return Ok(Credential::Key {
            path: expand_home(path),
            passphrase: None,
        });
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Credential::Password(password));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    DEFAULT_IDENTITIES
        .iter()
        .map(|rel| home.join(rel))
        .find(|path| path.exists())
        .map(|path| Credential::Key {
            path,
            passphrase: None,
        })
        .with_context(|| format!("pass -i KEY, set {PASSWORD_ENV}, or add the host to hosts.toml"))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Writes last-connected timestamps back into the hosts file, preserving
/// its formatting and comments.
pub struct TomlHostStore {
    path: PathBuf,
    // Sessions connect on their own threads.
    write_lock: Mutex<()>,
}

impl TomlHostStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

impl HostStore for TomlHostStore {
    fn record_last_connected(&self, host_id: &str, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", self.path)),
        };
        let mut doc: toml_edit::DocumentMut = content
            .parse()
            .with_context(|| format!("Failed to parse {:?}", self.path))?;

        let entry = doc
            .get_mut("hosts")
            .and_then(|item| item.as_array_of_tables_mut())
            .and_then(|hosts| {
                hosts
                    .iter_mut()
                    .find(|table| table.get("id").and_then(|v| v.as_str()) == Some(host_id))
            });
        let Some(entry) = entry else {
            // Ad-hoc targets are not in the file.
            tracing::debug!(host = host_id, "No saved host to update");
            return Ok(());
        };
        entry["last-connected"] = toml_edit::value(at.to_rfc3339_opts(SecondsFormat::Secs, true));

        std::fs::write(&self.path, doc.to_string())
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        tracing::debug!(host = host_id, "Recorded last connected time");
        Ok(())
    }
}
