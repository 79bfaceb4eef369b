use crate::event::SessionId;
use crate::state::SessionState;
use std::io;
use thiserror::Error;

/// Session lifecycle errors returned to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {id} cannot connect while {state}")]
    InvalidState { id: SessionId, state: SessionState },

    #[error("no session with id {0}")]
    NotFound(SessionId),

    #[error("failed to start session thread")]
    Spawn(#[source] io::Error),
}

/// Why input did not reach a session's shell.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("session is {0}, not connected")]
    NotConnected(SessionState),

    #[error("write to remote shell failed")]
    Write(#[source] io::Error),
}
