//! Session core for TabSSH.
//!
//! A [`SessionController`] drives one remote shell through its lifecycle and
//! owns the bridge to it. A [`SessionRegistry`] holds many of them behind a
//! single surface: one active session for interactive input, broadcast to
//! every connected one, and a single ordered event queue for the UI loop.

mod controller;
mod error;
mod event;
mod registry;
mod state;
mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use controller::{ConnectAttempt, ConnectOutcome, SessionController, SessionDeps};
pub use error::{CommandError, SessionError};
pub use event::{event_queue, SessionEvent, SessionEventKind, SessionId};
pub use registry::{BroadcastReport, SessionRegistry};
pub use state::SessionState;
pub use store::{HostStore, NoopHostStore};

#[cfg(any(test, feature = "test-support"))]
pub use store::MockHostStore;
