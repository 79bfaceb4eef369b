//! Map transport failures to an [`ErrorKind`].
//!
//! Typed `io::ErrorKind`s are trusted first. Everything else falls back to
//! substring matching on the message, which is fragile against wording
//! changes in the transport library, so all of it lives here.

use crate::error::{ConnectError, ErrorKind};
use std::io;

/// Ordered substring rules. The first match wins.
const RULES: &[(&[&str], ErrorKind)] = &[
    (&["auth"], ErrorKind::AuthenticationFailure),
    (
        &[
            "resolve",
            "lookup",
            "unknown host",
            "name or service not known",
            "nodename nor servname",
            "no such host",
        ],
        ErrorKind::HostResolutionFailure,
    ),
    (&["timed out", "timeout"], ErrorKind::ConnectionTimeout),
    (&["refused"], ErrorKind::ConnectionRefused),
    (&["unreachable"], ErrorKind::NetworkUnreachable),
    (
        &[
            "closed",
            "disconnect",
            "broken pipe",
            "reset by peer",
            "unexpected eof",
        ],
        ErrorKind::TransportClosedUnexpectedly,
    ),
];

/// Classify a message by its text alone.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map_or(ErrorKind::Unknown, |(_, kind)| *kind)
}

/// Classify an I/O error by its kind, if the kind is specific enough.
pub fn classify_io(error: &io::Error) -> Option<ErrorKind> {
    match error.kind() {
        io::ErrorKind::TimedOut => Some(ErrorKind::ConnectionTimeout),
        io::ErrorKind::ConnectionRefused => Some(ErrorKind::ConnectionRefused),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            Some(ErrorKind::NetworkUnreachable)
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(ErrorKind::TransportClosedUnexpectedly),
        _ => None,
    }
}

/// Classify an error chain. The full chain text is kept as the message.
///
/// Text rules only look at the root cause: context layers carry host and
/// user names, which must not decide the kind.
pub fn classify(error: &anyhow::Error) -> ConnectError {
    let message = format!("{error:#}");
    let typed = error.chain().find_map(|cause| {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            return classify_io(io);
        }
        match cause.downcast_ref::<russh::Error>() {
            Some(russh::Error::IO(io)) => classify_io(io),
            _ => None,
        }
    });
    let kind = typed.unwrap_or_else(|| classify_message(&error.root_cause().to_string()));
    ConnectError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use test_case::test_case;

    #[test_case("Connection refused (os error 111)", ErrorKind::ConnectionRefused ; "refused")]
    #[test_case("failed to resolve address web-1", ErrorKind::HostResolutionFailure ; "resolve")]
    #[test_case("failed to lookup address information: Name or service not known", ErrorKind::HostResolutionFailure ; "getaddrinfo")]
    #[test_case("Authentication rejected for admin", ErrorKind::AuthenticationFailure ; "auth")]
    #[test_case("connect timed out after 30s", ErrorKind::ConnectionTimeout ; "timed out")]
    #[test_case("Network is unreachable (os error 101)", ErrorKind::NetworkUnreachable ; "unreachable")]
    #[test_case("channel closed", ErrorKind::TransportClosedUnexpectedly ; "closed")]
    #[test_case("Connection reset by peer", ErrorKind::TransportClosedUnexpectedly ; "reset")]
    #[test_case("KEX negotiation failed", ErrorKind::Unknown ; "unmatched")]
    fn classifies_message(message: &str, expected: ErrorKind) {
        assert_eq!(classify_message(message), expected);
    }

    #[test]
    fn auth_wins_over_closed() {
        assert_eq!(
            classify_message("connection closed during authentication"),
            ErrorKind::AuthenticationFailure
        );
    }

    #[test]
    fn unknown_preserves_original_text() {
        let err = classify(&anyhow::anyhow!("Weird: protocol version mismatch"));
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "Weird: protocol version mismatch");
        assert_eq!(err.user_message(), "Weird: protocol version mismatch");
    }

    #[test]
    fn typed_io_kind_beats_message_text() {
        let io = io::Error::new(io::ErrorKind::ConnectionRefused, "os says no");
        let err = classify(&anyhow::Error::new(io).context("connecting to web-1:22"));
        assert_eq!(err.kind, ErrorKind::ConnectionRefused);
        assert!(err.message.contains("connecting to web-1:22"));
    }

    #[test]
    fn context_chain_is_searched() {
        let result: anyhow::Result<()> =
            Err(anyhow::anyhow!("Connection refused")).context("opening session");
        let err = classify(&result.unwrap_err());
        assert_eq!(err.kind, ErrorKind::ConnectionRefused);
    }

    #[test]
    fn host_name_in_context_does_not_decide_kind() {
        let result: anyhow::Result<()> = Err(io::Error::other(
            "failed to lookup address information: Name or service not known",
        ))
        .context("failed to connect to oauth-gw.example.com:22");
        let err = classify(&result.unwrap_err());
        assert_eq!(err.kind, ErrorKind::HostResolutionFailure);
        assert!(err.message.starts_with("failed to connect to oauth-gw.example.com:22"));
    }

    #[test]
    fn user_name_in_context_does_not_decide_kind() {
        let result: anyhow::Result<()> =
            Err(anyhow::anyhow!("Connection refused")).context("opening shell for timeout-bot");
        let err = classify(&result.unwrap_err());
        assert_eq!(err.kind, ErrorKind::ConnectionRefused);
    }

    #[test]
    fn generic_io_kind_falls_back_to_text() {
        let io = io::Error::other("failed to resolve host");
        let err = classify(&anyhow::Error::new(io));
        assert_eq!(err.kind, ErrorKind::HostResolutionFailure);
    }
}
