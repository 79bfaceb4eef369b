//! PTY bridges: the seam between a shell channel and a terminal consumer.
//!
//! Two strategies share the same plumbing:
//! - [`EmulatorBridge`] hands decoded text over untouched; the consumer is a
//!   full terminal emulator and needs every escape sequence.
//! - [`RawBridge`] strips CSI/OSC sequences itself so the consumer can be a
//!   plain text sink.
//!
//! Both serialize writes with a lock held across `write_all` + `flush`, so
//! bytes from concurrent writers never interleave inside one call.

use crate::decode::Utf8Decoder;
use crate::strip::AnsiStripper;
use crate::types::{ChannelControl, ShellChannel, TermSize};
use parking_lot::Mutex;
use settings::constants::session::READ_BUFFER_SIZE;
use settings::RendererKind;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Byte-level connection between one session and one remote shell.
pub trait PtyBridge: Send + Sync {
    /// Block until the next chunk of text arrives. `Ok(None)` means the
    /// remote side closed the stream.
    fn read(&self) -> io::Result<Option<String>>;

    /// Send bytes to the remote shell and flush them.
    fn write(&self, data: &[u8]) -> io::Result<()>;

    /// Forward a window-size change. No-op once the channel is gone.
    fn resize(&self, size: TermSize) -> io::Result<()>;

    /// Whether the underlying channel is still open.
    fn is_connected(&self) -> bool;

    /// Close the channel. Safe to call more than once.
    fn close(&self) -> io::Result<()>;

    /// Which rendering strategy this bridge feeds.
    fn kind(&self) -> RendererKind;
}

/// Open the bridge matching `kind` over `channel`.
pub fn open_bridge(kind: RendererKind, channel: ShellChannel) -> Arc<dyn PtyBridge> {
    match kind {
        RendererKind::Emulator => Arc::new(EmulatorBridge::new(channel)),
        RendererKind::Raw => Arc::new(RawBridge::new(channel)),
    }
}

struct ReadState {
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
    decoder: Utf8Decoder,
}

/// Plumbing shared by both bridges.
struct ChannelIo {
    read: Mutex<ReadState>,
    writer: Mutex<Box<dyn Write + Send>>,
    control: Box<dyn ChannelControl>,
    closed: AtomicBool,
}

impl ChannelIo {
    fn new(channel: ShellChannel) -> Self {
        Self {
            read: Mutex::new(ReadState {
                reader: channel.reader,
                buf: vec![0; READ_BUFFER_SIZE],
                decoder: Utf8Decoder::new(),
            }),
            writer: Mutex::new(channel.writer),
            control: channel.control,
            closed: AtomicBool::new(false),
        }
    }

    fn read_text(&self) -> io::Result<Option<String>> {
        let mut state = self.read.lock();
        let ReadState {
            reader,
            buf,
            decoder,
        } = &mut *state;

        loop {
            let n = reader.read(buf)?;
            if n == 0 {
                let rest = decoder.finish();
                return Ok((!rest.is_empty()).then_some(rest));
            }
            let text = decoder.decode(&buf[..n]);
            // A chunk holding only part of a character yields nothing yet.
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "channel is closed",
            ));
        }
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()
    }

    fn resize(&self, size: TermSize) -> io::Result<()> {
        if !self.is_connected() {
            tracing::trace!("Ignoring resize to {} on closed channel", size);
            return Ok(());
        }
        self.control.resize(size)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.control.is_open()
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.control.close()
    }
}

/// Passes decoded text through verbatim for a terminal emulator.
pub struct EmulatorBridge {
    io: ChannelIo,
}

impl EmulatorBridge {
    pub fn new(channel: ShellChannel) -> Self {
        Self {
            io: ChannelIo::new(channel),
        }
    }
}

impl PtyBridge for EmulatorBridge {
    fn read(&self) -> io::Result<Option<String>> {
        self.io.read_text()
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        self.io.write(data)
    }

    fn resize(&self, size: TermSize) -> io::Result<()> {
        self.io.resize(size)
    }

    fn is_connected(&self) -> bool {
        self.io.is_connected()
    }

    fn close(&self) -> io::Result<()> {
        self.io.close()
    }

    fn kind(&self) -> RendererKind {
        RendererKind::Emulator
    }
}

/// Strips control sequences so a plain-text consumer can display output.
pub struct RawBridge {
    io: ChannelIo,
    stripper: Mutex<AnsiStripper>,
}

impl RawBridge {
    pub fn new(channel: ShellChannel) -> Self {
        Self {
            io: ChannelIo::new(channel),
            stripper: Mutex::new(AnsiStripper::new()),
        }
    }
}

impl PtyBridge for RawBridge {
    fn read(&self) -> io::Result<Option<String>> {
        loop {
            let Some(text) = self.io.read_text()? else {
                // Whatever the stripper held back is released as text once.
                let rest = self.stripper.lock().finish();
                if !rest.is_empty() {
                    tracing::trace!("Releasing {} bytes of unterminated escape", rest.len());
                    return Ok(Some(rest));
                }
                return Ok(None);
            };
            let stripped = self.stripper.lock().push(&text);
            // Chunks made only of escape sequences produce no output.
            if !stripped.is_empty() {
                return Ok(Some(stripped));
            }
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        self.io.write(data)
    }

    fn resize(&self, size: TermSize) -> io::Result<()> {
        self.io.resize(size)
    }

    fn is_connected(&self) -> bool {
        self.io.is_connected()
    }

    fn close(&self) -> io::Result<()> {
        self.io.close()
    }

    fn kind(&self) -> RendererKind {
        RendererKind::Raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeChannel;
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn emulator_bridge_keeps_escape_sequences() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        fake.feed(b"\x1b[31mred\x1b[0m");
        assert_eq!(bridge.read().unwrap().as_deref(), Some("\x1b[31mred\x1b[0m"));
        assert_eq!(bridge.kind(), RendererKind::Emulator);
    }

    #[test]
    fn raw_bridge_strips_sequences() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Raw, fake.channel());
        fake.feed(b"\x1b]0;title\x07");
        fake.feed(b"\x1b[32mok\x1b[0m");
        assert_eq!(bridge.read().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn read_joins_split_characters() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        let bytes = "ü".as_bytes();
        fake.feed(&bytes[..1]);
        fake.feed(&bytes[1..]);
        assert_eq!(bridge.read().unwrap().as_deref(), Some("ü"));
    }

    #[test]
    fn remote_eof_reads_none() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Raw, fake.channel());
        fake.finish();
        assert_eq!(bridge.read().unwrap(), None);
    }

    #[test]
    fn raw_bridge_releases_unterminated_escape_at_eof() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Raw, fake.channel());
        fake.feed(b"done\x1b[1");
        fake.finish();
        assert_eq!(bridge.read().unwrap().as_deref(), Some("done"));
        assert_eq!(bridge.read().unwrap().as_deref(), Some("\x1b[1"));
        assert_eq!(bridge.read().unwrap(), None);
    }

    #[test]
    fn write_reaches_channel() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        bridge.write(b"ls\n").unwrap();
        assert_eq!(fake.written(), b"ls\n");
    }

    #[test]
    fn write_after_close_fails() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        bridge.close().unwrap();
        let err = bridge.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert!(fake.written().is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        bridge.close().unwrap();
        bridge.close().unwrap();
        assert!(!bridge.is_connected());
        assert_eq!(fake.close_count(), 1);
    }

    #[test]
    fn resize_forwards_while_open() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        bridge.resize(TermSize::new(200, 50, 1600, 800)).unwrap();
        assert_eq!(fake.resizes(), vec![TermSize::new(200, 50, 1600, 800)]);
    }

    #[test]
    fn resize_after_close_is_ignored() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Raw, fake.channel());
        bridge.close().unwrap();
        bridge.resize(TermSize::from_cells(80, 24)).unwrap();
        assert!(fake.resizes().is_empty());
    }

    #[test]
    fn close_unblocks_pending_read() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        let reader = {
            let bridge = bridge.clone();
            thread::spawn(move || bridge.read())
        };
        thread::sleep(Duration::from_millis(20));
        bridge.close().unwrap();
        assert!(reader.join().unwrap().is_err());
    }

    #[test]
    fn concurrent_writes_never_interleave() {
        let fake = FakeChannel::new();
        let bridge = open_bridge(RendererKind::Emulator, fake.channel());
        let writers: Vec<_> = (0..8u8)
            .map(|i| {
                let bridge = bridge.clone();
                thread::spawn(move || bridge.write(&[b'a' + i; 100]).unwrap())
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let written = fake.written();
        assert_eq!(written.len(), 800);
        for chunk in written.chunks(100) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
    }
}
