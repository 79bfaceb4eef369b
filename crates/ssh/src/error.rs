//! User-facing connection error taxonomy.

use std::fmt;
use thiserror::Error;

/// What went wrong, as far as a user needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailure,
    HostResolutionFailure,
    ConnectionTimeout,
    ConnectionRefused,
    NetworkUnreachable,
    TransportClosedUnexpectedly,
    Unknown,
}

impl ErrorKind {
    /// Fixed explanation for this kind. `Unknown` has none; the raw message
    /// is shown instead.
    pub fn description(self) -> Option<&'static str> {
        match self {
            Self::AuthenticationFailure => {
                Some("Authentication failed. Check the username, password or key.")
            }
            Self::HostResolutionFailure => {
                Some("Could not resolve host. Check the hostname and your DNS settings.")
            }
            Self::ConnectionTimeout => {
                Some("Connection timed out. The host may be down or blocked by a firewall.")
            }
            Self::ConnectionRefused => {
                Some("Connection refused. Check that SSH is running on the given port.")
            }
            Self::NetworkUnreachable => {
                Some("Network unreachable. Check your network connection.")
            }
            Self::TransportClosedUnexpectedly => Some("Connection closed unexpectedly."),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthenticationFailure => "authentication failure",
            Self::HostResolutionFailure => "host resolution failure",
            Self::ConnectionTimeout => "connection timeout",
            Self::ConnectionRefused => "connection refused",
            Self::NetworkUnreachable => "network unreachable",
            Self::TransportClosedUnexpectedly => "transport closed unexpectedly",
            Self::Unknown => "unknown error",
        };
        f.write_str(name)
    }
}

/// A classified connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectError {
    pub kind: ErrorKind,
    /// Original transport message, kept verbatim.
    pub message: String,
}

impl ConnectError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Text to show the user. Unknown errors show the original message.
    pub fn user_message(&self) -> String {
        match self.kind.description() {
            Some(text) => text.to_string(),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_shows_raw_message() {
        let err = ConnectError::new(ErrorKind::Unknown, "kex algorithm mismatch: foo-bar");
        assert_eq!(err.user_message(), "kex algorithm mismatch: foo-bar");
    }

    #[test]
    fn known_kinds_hide_raw_message() {
        let err = ConnectError::new(ErrorKind::ConnectionRefused, "os error 111");
        assert!(err.user_message().starts_with("Connection refused"));
        assert!(!err.user_message().contains("111"));
    }

    #[test]
    fn every_kind_but_unknown_has_description() {
        use ErrorKind::*;
        for kind in [
            AuthenticationFailure,
            HostResolutionFailure,
            ConnectionTimeout,
            ConnectionRefused,
            NetworkUnreachable,
            TransportClosedUnexpectedly,
        ] {
            assert!(kind.description().is_some(), "{kind} has no description");
        }
        assert!(Unknown.description().is_none());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = ConnectError::new(ErrorKind::ConnectionTimeout, "after 30s");
        assert_eq!(err.to_string(), "connection timeout: after 30s");
    }
}
