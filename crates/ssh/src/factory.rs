use crate::error::ConnectError;
use crate::host::HostDescriptor;
use std::time::Duration;
use terminal::ShellChannel;

/// Opens authenticated interactive shell channels.
///
/// `open` blocks the calling thread for at most `timeout`. Implementations
/// do not retry; that is the caller's decision.
pub trait ConnectionFactory: Send + Sync {
    fn open(&self, host: &HostDescriptor, timeout: Duration) -> Result<ShellChannel, ConnectError>;
}
