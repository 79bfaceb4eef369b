//! SSH transport for TabSSH.
//!
//! Turns a [`HostDescriptor`] into an authenticated interactive shell
//! channel, and turns transport failures into the small [`ErrorKind`]
//! taxonomy shown to users.

mod classify;
mod client;
mod error;
mod factory;
mod host;

pub use classify::{classify, classify_io, classify_message};
pub use client::SshConnectionFactory;
pub use error::{ConnectError, ErrorKind};
pub use factory::ConnectionFactory;
pub use host::{Credential, HostDescriptor};
