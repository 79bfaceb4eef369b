//! Session events and the queue that carries them to the UI loop.

use crate::state::SessionState;
use settings::constants::session::EVENT_QUEUE_CAPACITY;
use ssh::ConnectError;
use std::fmt;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use uuid::Uuid;

/// Opaque session identity. A reconnect always gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell tabs apart in logs.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Something the UI loop should know about one session.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone)]
pub enum SessionEventKind {
    /// Human-readable status line.
    Status(String),
    /// The session moved to a new state.
    State(SessionState),
    /// Text read from the remote shell, in arrival order.
    Output(String),
    /// The session failed. Sent at most once per session.
    Failed(ConnectError),
}

/// Bounded, ordered queue shared by every session of a registry.
pub fn event_queue() -> (SyncSender<SessionEvent>, Receiver<SessionEvent>) {
    sync_channel(EVENT_QUEUE_CAPACITY)
}
