//! Scripted connection factory and helpers for session tests.

use crate::controller::SessionDeps;
use crate::event::{event_queue, SessionEvent, SessionEventKind, SessionId};
use crate::state::SessionState;
use crate::store::{HostStore, NoopHostStore};
use parking_lot::Mutex;
use ssh::{ConnectError, ConnectionFactory, Credential, ErrorKind, HostDescriptor};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use terminal::test_support::FakeChannel;
use terminal::ShellChannel;

struct Scripted {
    delay: Duration,
    result: Result<Arc<FakeChannel>, ConnectError>,
}

/// Connection factory that replays queued outcomes in order.
#[derive(Default)]
pub struct FakeConnectionFactory {
    script: Mutex<VecDeque<Scripted>>,
    opened: AtomicUsize,
    timeouts: Mutex<Vec<Duration>>,
}

impl FakeConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `open` succeeds. Returns the remote end of the channel.
    pub fn push_channel(&self) -> Arc<FakeChannel> {
        self.push_delayed_channel(Duration::ZERO)
    }

    /// Next `open` succeeds after `delay`.
    pub fn push_delayed_channel(&self, delay: Duration) -> Arc<FakeChannel> {
        let remote = Arc::new(FakeChannel::new());
        self.script.lock().push_back(Scripted {
            delay,
            result: Ok(remote.clone()),
        });
        remote
    }

    /// Next `open` fails with `kind`.
    pub fn push_error(&self, kind: ErrorKind, message: &str) {
        self.script.lock().push_back(Scripted {
            delay: Duration::ZERO,
            result: Err(ConnectError::new(kind, message)),
        });
    }

    /// How many times `open` was called.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }

    /// Timeouts passed to `open`, in call order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().clone()
    }
}

impl ConnectionFactory for FakeConnectionFactory {
    fn open(&self, _host: &HostDescriptor, timeout: Duration) -> Result<ShellChannel, ConnectError> {
        self.opened.fetch_add(1, Ordering::AcqRel);
        self.timeouts.lock().push(timeout);
        let next = self.script.lock().pop_front();
        let Some(scripted) = next else {
            return Err(ConnectError::new(ErrorKind::Unknown, "no scripted connection"));
        };
        std::thread::sleep(scripted.delay);
        scripted.result.map(|remote| remote.channel())
    }
}

/// Password host `deploy@<hostname>:22`.
pub fn test_host(hostname: &str) -> HostDescriptor {
    HostDescriptor::new(hostname, "deploy", Credential::Password("secret".into()))
        .with_name(hostname, hostname)
}

/// Deps wired to `factory` with default settings.
pub fn test_deps(
    factory: Arc<dyn ConnectionFactory>,
    store: Option<Arc<dyn HostStore>>,
) -> (SessionDeps, Receiver<SessionEvent>) {
    let (events, rx) = event_queue();
    let deps = SessionDeps {
        factory,
        store: store.unwrap_or_else(|| Arc::new(NoopHostStore)),
        config: Arc::new(settings::Config::default()),
        events,
    };
    (deps, rx)
}

/// Drain events until `pred` matches one, failing after `timeout`.
pub fn wait_for_event(
    rx: &Receiver<SessionEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx
            .recv_timeout(remaining)
            .unwrap_or_else(|_| panic!("timed out waiting for event; saw {seen:#?}"));
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Wait for `session` to reach `state`.
pub fn wait_for_state(
    rx: &Receiver<SessionEvent>,
    session: SessionId,
    state: SessionState,
) -> Vec<SessionEvent> {
    wait_for_event(rx, Duration::from_secs(5), |event| {
        event.session == session && matches!(event.kind, SessionEventKind::State(s) if s == state)
    })
}

/// Poll `cond` until it holds, failing after five seconds.
pub fn eventually(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        std::thread::sleep(Duration::from_millis(5));
    }
}
