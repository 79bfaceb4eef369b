//! Terminal plumbing for TabSSH sessions.
//!
//! Sits between an interactive shell channel and whatever displays its output.
//! A [`PtyBridge`] owns the channel and turns raw bytes into text, a
//! [`TerminalConsumer`] turns text into something a user can look at.
//! Nothing here knows about SSH; the `ssh` crate supplies a [`ShellChannel`].

mod bridge;
mod consumer;
mod decode;
mod emulator;
mod input;
mod strip;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bridge::{open_bridge, EmulatorBridge, PtyBridge, RawBridge};
pub use consumer::{consumer_for, PlainTextConsumer, TerminalConsumer};
pub use decode::Utf8Decoder;
pub use emulator::EmulatorConsumer;
pub use input::{encode_key, KeyInput};
pub use strip::AnsiStripper;
pub use types::*;
