//! In-memory shell channel for tests.
//!
//! `FakeChannel` plays the remote side: tests feed output into it and
//! inspect what the session wrote, resized or closed.

use crate::types::{ChannelControl, ShellChannel, TermSize};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// Largest slice the fake writer accepts per call, so `write_all` has to
/// loop the way it would on a real socket.
const MAX_WRITE_CHUNK: usize = 16;

enum Incoming {
    Data(Vec<u8>),
    Eof,
    Closed,
    Broken,
}

#[derive(Default)]
struct Shared {
    written: Mutex<Vec<u8>>,
    resizes: Mutex<Vec<TermSize>>,
    closed: AtomicBool,
    close_count: AtomicUsize,
    fail_writes: AtomicBool,
}

/// Remote end of an in-memory [`ShellChannel`].
pub struct FakeChannel {
    tx: Sender<Incoming>,
    rx: Mutex<Option<Receiver<Incoming>>>,
    shared: Arc<Shared>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChannel {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Session side of the channel. Can be taken once.
    pub fn channel(&self) -> ShellChannel {
        let rx = self
            .rx
            .lock()
            .take()
            .expect("FakeChannel::channel called twice");
        ShellChannel::new(
            FakeReader {
                rx,
                chunk: Vec::new(),
                pos: 0,
                done: None,
            },
            FakeWriter {
                shared: self.shared.clone(),
            },
            FakeControl {
                tx: self.tx.clone(),
                shared: self.shared.clone(),
            },
        )
    }

    /// Deliver output from the remote shell.
    pub fn feed(&self, bytes: &[u8]) {
        let _ = self.tx.send(Incoming::Data(bytes.to_vec()));
    }

    /// Remote shell exits cleanly.
    pub fn finish(&self) {
        let _ = self.tx.send(Incoming::Eof);
    }

    /// Transport drops underneath the session.
    pub fn break_connection(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let _ = self.tx.send(Incoming::Broken);
    }

    /// Make subsequent writes fail with a broken pipe.
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::Release);
    }

    /// Everything written by the session so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// Everything written, decoded lossily.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.written.lock()).into_owned()
    }

    /// Every resize forwarded to the remote side.
    pub fn resizes(&self) -> Vec<TermSize> {
        self.shared.resizes.lock().clone()
    }

    /// How many times the session closed the channel.
    pub fn close_count(&self) -> usize {
        self.shared.close_count.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

struct FakeReader {
    rx: Receiver<Incoming>,
    chunk: Vec<u8>,
    pos: usize,
    done: Option<io::ErrorKind>,
}

impl Read for FakeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.done {
                Some(io::ErrorKind::UnexpectedEof) => return Ok(0),
                Some(kind) => return Err(io::Error::new(kind, "channel closed")),
                None => {}
            }
            match self.rx.recv() {
                Ok(Incoming::Data(data)) => {
                    self.chunk = data;
                    self.pos = 0;
                }
                Ok(Incoming::Eof) | Err(_) => self.done = Some(io::ErrorKind::UnexpectedEof),
                Ok(Incoming::Closed) => self.done = Some(io::ErrorKind::ConnectionAborted),
                Ok(Incoming::Broken) => self.done = Some(io::ErrorKind::ConnectionReset),
            }
        }

        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct FakeWriter {
    shared: Arc<Shared>,
}

impl Write for FakeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shared.fail_writes.load(Ordering::Acquire)
            || self.shared.closed.load(Ordering::Acquire)
        {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        let n = buf.len().min(MAX_WRITE_CHUNK);
        self.shared.written.lock().extend_from_slice(&buf[..n]);
        // Give other writers a chance to interleave if locking is wrong.
        std::thread::yield_now();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FakeControl {
    tx: Sender<Incoming>,
    shared: Arc<Shared>,
}

impl ChannelControl for FakeControl {
    fn resize(&self, size: TermSize) -> io::Result<()> {
        self.shared.resizes.lock().push(size);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.close_count.fetch_add(1, Ordering::AcqRel);
        let _ = self.tx.send(Incoming::Closed);
        Ok(())
    }
}
