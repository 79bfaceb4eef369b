use chrono::{DateTime, Utc};

/// Write-back hook into the host list owned by the surrounding application.
#[cfg_attr(any(test, feature = "test-support"), mockall::automock)]
pub trait HostStore: Send + Sync {
    /// Persist the time a host was last connected to.
    fn record_last_connected(&self, host_id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Host store that persists nothing, for ad-hoc targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostStore;

impl HostStore for NoopHostStore {
    fn record_last_connected(&self, _host_id: &str, _at: DateTime<Utc>) -> anyhow::Result<()> {
        Ok(())
    }
}
