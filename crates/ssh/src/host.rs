//! Host descriptors and credentials.

use chrono::{DateTime, Utc};
use settings::constants::connection::DEFAULT_PORT;
use std::fmt;
use std::path::PathBuf;

const REDACTED: &str = "***";

/// Secret material used to authenticate. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl Credential {
    /// Short label for the auth method, safe to log.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::Key { .. } => "publickey",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.debug_tuple("Password").field(&REDACTED).finish(),
            Self::Key { path, passphrase } => f
                .debug_struct("Key")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| REDACTED))
                .finish(),
        }
    }
}

/// Connection parameters for one remote host.
///
/// Treated as immutable once handed to a connection factory. The
/// last-connected timestamp is written back through the host store, not
/// through this value.
#[derive(Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    /// Stable identifier in the host list.
    pub id: String,
    /// Display name for tabs and status lines.
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    /// Command typed into the shell once it is ready.
    pub startup_command: Option<String>,
    pub last_connected: Option<DateTime<Utc>>,
}

impl HostDescriptor {
    /// Descriptor with the default port and no startup command. `id` and
    /// `name` default to `user@host`.
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        credential: Credential,
    ) -> Self {
        let hostname = hostname.into();
        let username = username.into();
        let id = format!("{username}@{hostname}");
        Self {
            name: id.clone(),
            id,
            hostname,
            port: DEFAULT_PORT,
            username,
            credential,
            startup_command: None,
            last_connected: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_name(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.id = id.into();
        self.name = name.into();
        self
    }

    pub fn with_startup_command(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        self.startup_command = (!command.trim().is_empty()).then_some(command);
        self
    }

    /// `host:port` for the transport. IPv6 literals are bracketed.
    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.address())
    }
}

impl fmt::Debug for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("credential", &self.credential)
            .field("startup_command", &self.startup_command)
            .field("last_connected", &self.last_connected)
            .finish()
    }
}
