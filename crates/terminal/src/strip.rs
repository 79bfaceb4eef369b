//! Control-sequence stripping for the plain-text renderer.
//!
//! Two rules, applied independently:
//! - CSI: `ESC [`, parameter bytes, intermediate bytes, one final byte.
//! - OSC: `ESC ]`, payload, terminated by BEL or `ESC \`.
//!
//! Anything else passes through. A sequence split across two chunks is held
//! back until the rest of it arrives.

use regex::Regex;
use std::sync::LazyLock;

static CSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("CSI pattern is valid")
});

static OSC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").expect("OSC pattern is valid")
});

/// Longest unterminated sequence worth holding back. Beyond this the bytes
/// are treated as text rather than buffered forever.
const MAX_CARRY: usize = 4096;

/// Strips CSI and OSC sequences from a stream of text chunks.
#[derive(Debug, Default)]
pub struct AnsiStripper {
    carry: String,
}

impl AnsiStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip one chunk. Returns the printable text that is safe to emit now.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);

        if let Some(start) = incomplete_tail(&text) {
            self.carry = text.split_off(start);
        }

        strip(&text)
    }

    /// Release whatever is held back once the stream has ended. A sequence
    /// that never completed is returned as text.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.carry);
        strip(&rest)
    }
}

/// Strip complete CSI and OSC sequences from a single string.
pub fn strip(text: &str) -> String {
    if !text.contains('\x1b') {
        return text.to_string();
    }
    let without_osc = OSC.replace_all(text, "");
    CSI.replace_all(&without_osc, "").into_owned()
}

/// Byte offset where an unterminated escape sequence starts, if the text
/// ends inside one.
fn incomplete_tail(text: &str) -> Option<usize> {
    // An open OSC swallows everything up to its terminator, including a
    // lone ESC that may be the first half of `ESC \`.
    if let Some(start) = text.rfind("\x1b]") {
        let body = &text[start + 2..];
        let terminated = body.contains('\x07') || body.contains("\x1b\\");
        if !terminated {
            return (text.len() - start <= MAX_CARRY).then_some(start);
        }
    }

    let start = text.rfind('\x1b')?;
    let tail = &text[start + 1..];
    let open = match tail.as_bytes().split_first() {
        None => true,
        Some((b'[', rest)) => rest.iter().all(|b| (0x20..=0x3f).contains(b)),
        Some(_) => false,
    };
    (open && text.len() - start <= MAX_CARRY).then_some(start)
}
