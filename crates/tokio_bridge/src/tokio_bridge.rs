//! Tokio bridge for TabSSH.
//!
//! The session core is built on plain OS threads. The SSH transport is async,
//! so this crate runs a small Tokio runtime alongside those threads and lets
//! them hand futures over and block on the result.

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Worker threads for the transport runtime. SSH channel pumps are I/O bound.
const WORKER_THREADS: usize = 2;

/// Owns the Tokio runtime shared by every session.
pub struct TokioBridge {
    runtime: Runtime,
}

impl TokioBridge {
    /// Start the runtime. Call once during startup and share the result.
    pub fn new() -> io::Result<Arc<Self>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("tabssh-tokio")
            .enable_all()
            .build()?;
        tracing::debug!("Tokio runtime started with {} workers", WORKER_THREADS);
        Ok(Arc::new(Self { runtime }))
    }

    /// Run a future to completion from a non-async thread.
    ///
    /// Must not be called from inside the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Spawn a future on the runtime's thread pool.
    pub fn spawn<Fut>(&self, future: Fut) -> JoinHandle<Fut::Output>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.runtime.spawn(future)
    }
}
