//! Session controller: one remote shell, one state machine.
//!
//! `connect` returns immediately. A dedicated thread per session opens the
//! channel, then stays on as the blocking reader for the session's
//! lifetime. Everything it learns goes out on the shared event queue.
//!
//! Closing the bridge is the only cancellation mechanism: `disconnect`
//! marks the session closed first, then closes the bridge, so the reader's
//! failed read is recognised as a local close rather than a transport fault.

use crate::error::{CommandError, SessionError};
use crate::event::{SessionEvent, SessionEventKind, SessionId};
use crate::state::SessionState;
use crate::store::HostStore;
use chrono::Utc;
use parking_lot::Mutex;
use ssh::{ConnectError, ConnectionFactory, ErrorKind, HostDescriptor};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use terminal::{encode_key, open_bridge, KeyInput, PtyBridge, TermSize};

/// Collaborators every session needs. Cheap to clone.
#[derive(Clone)]
pub struct SessionDeps {
    pub factory: Arc<dyn ConnectionFactory>,
    pub store: Arc<dyn HostStore>,
    pub config: Arc<settings::Config>,
    pub events: SyncSender<SessionEvent>,
}

/// Result of a connection attempt, as seen by whoever started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Failed(ConnectError),
    /// The session was disconnected before the attempt finished.
    Cancelled,
}

/// Handle on an in-flight `connect`.
pub struct ConnectAttempt {
    session: SessionId,
    outcome: Receiver<ConnectOutcome>,
}

impl ConnectAttempt {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Block until the attempt resolves.
    pub fn wait(self) -> ConnectOutcome {
        self.outcome.recv().unwrap_or(ConnectOutcome::Cancelled)
    }

    /// Block for at most `timeout`. `None` if still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ConnectOutcome> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(ConnectOutcome::Cancelled),
        }
    }

    /// Non-blocking check.
    pub fn try_outcome(&self) -> Option<ConnectOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(ConnectOutcome::Cancelled),
        }
    }
}

/// How an event is handed to the queue.
#[derive(Clone, Copy)]
enum Delivery {
    /// Session thread: wait for room so nothing is dropped or reordered.
    Blocking,
    /// Caller's thread, which may be the one draining the queue: never wait.
    BestEffort,
}

struct Inner {
    id: SessionId,
    deps: SessionDeps,
    state: Mutex<SessionState>,
    host: Mutex<Option<HostDescriptor>>,
    bridge: Mutex<Option<Arc<dyn PtyBridge>>>,
    startup_command: Mutex<Option<String>>,
}

/// Drives one session. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: SessionId::new(),
                deps,
                state: Mutex::new(SessionState::Disconnected),
                host: Mutex::new(None),
                bridge: Mutex::new(None),
                startup_command: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Host this session was connected to, once `connect` has been called.
    pub fn host(&self) -> Option<HostDescriptor> {
        self.inner.host.lock().clone()
    }

    /// Start connecting. Returns as soon as the session thread is running.
    ///
    /// Only valid on a fresh session; a finished session stays finished.
    pub fn connect(&self, host: HostDescriptor) -> Result<ConnectAttempt, SessionError> {
        if !self.transition(SessionState::Connecting, Delivery::BestEffort) {
            return Err(SessionError::InvalidState {
                id: self.id(),
                state: self.state(),
            });
        }

        *self.inner.host.lock() = Some(host.clone());
        *self.inner.startup_command.lock() = host.startup_command.clone();
        self.publish(
            SessionEventKind::Status(format!("Connecting to {host}...")),
            Delivery::BestEffort,
        );

        let (outcome_tx, outcome_rx) = mpsc::sync_channel(1);
        let this = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("tabssh-session-{}", self.id()))
            .spawn(move || this.run(host, outcome_tx));

        if let Err(e) = spawned {
            tracing::error!(session = %self.id(), "Failed to spawn session thread: {}", e);
            self.transition(SessionState::Failed, Delivery::BestEffort);
            return Err(SessionError::Spawn(e));
        }

        Ok(ConnectAttempt {
            session: self.id(),
            outcome: outcome_rx,
        })
    }

    /// Whether the bridge reports a live channel. False without a bridge.
    pub fn is_connected(&self) -> bool {
        self.inner
            .bridge
            .lock()
            .as_ref()
            .is_some_and(|bridge| bridge.is_connected())
    }

    /// Send `text` plus a newline. Logs and drops it if the session is not
    /// connected or the write fails.
    pub fn execute_command(&self, text: &str) {
        if let Err(e) = self.try_execute_command(text) {
            tracing::warn!(session = %self.id(), "Command not sent: {}", e);
        }
    }

    /// Like [`Self::execute_command`], reporting why input was not sent.
    pub fn try_execute_command(&self, text: &str) -> Result<(), CommandError> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(line.as_bytes())
    }

    /// Send raw bytes, such as terminal replies or pasted text.
    pub fn write(&self, data: &[u8]) -> Result<(), CommandError> {
        let bridge = self.live_bridge()?;
        bridge.write(data).map_err(|e| {
            tracing::debug!(session = %self.id(), "Write failed: {}", e);
            CommandError::Write(e)
        })
    }

    /// Send a key press using the plain-terminal key encoding.
    pub fn send_key(&self, key: KeyInput) -> Result<(), CommandError> {
        match encode_key(key) {
            Some(bytes) => self.write(&bytes),
            None => {
                tracing::trace!(session = %self.id(), ?key, "Key suppressed");
                Ok(())
            }
        }
    }

    /// Forward a new window size. No-op while there is no live channel.
    pub fn resize(&self, cols: u16, rows: u16, pixel_width: u16, pixel_height: u16) {
        let Some(bridge) = self.inner.bridge.lock().clone() else {
            tracing::trace!(session = %self.id(), "Resize ignored, no channel");
            return;
        };
        let size = TermSize::new(cols, rows, pixel_width, pixel_height);
        if let Err(e) = bridge.resize(size) {
            tracing::warn!(session = %self.id(), "Resize to {} failed: {}", size, e);
        }
    }

    /// Close the session. Never fails; repeated calls do nothing.
    pub fn disconnect(&self) {
        if !self.transition(SessionState::Closed, Delivery::BestEffort) {
            return;
        }
        tracing::info!(session = %self.id(), "Session disconnected");
        self.release_bridge();
    }

    fn live_bridge(&self) -> Result<Arc<dyn PtyBridge>, CommandError> {
        let state = self.state();
        if state != SessionState::Connected {
            return Err(CommandError::NotConnected(state));
        }
        self.inner
            .bridge
            .lock()
            .clone()
            .ok_or(CommandError::NotConnected(state))
    }

    /// Body of the session thread.
    fn run(self, host: HostDescriptor, outcome: SyncSender<ConnectOutcome>) {
        let deps = &self.inner.deps;
        let channel = match deps.factory.open(&host, deps.config.connect_timeout()) {
            Ok(channel) => channel,
            Err(error) => {
                let reported = self.fail(error.clone());
                let _ = outcome.send(if reported {
                    ConnectOutcome::Failed(error)
                } else {
                    ConnectOutcome::Cancelled
                });
                return;
            }
        };

        let bridge = open_bridge(deps.config.renderer, channel);
        *self.inner.bridge.lock() = Some(bridge.clone());

        if !self.transition(SessionState::Connected, Delivery::Blocking) {
            // Disconnected while the handshake was in flight.
            tracing::debug!(session = %self.id(), "Connect finished after disconnect");
            self.release_bridge();
            let _ = bridge.close();
            let _ = outcome.send(ConnectOutcome::Cancelled);
            return;
        }

        tracing::info!(session = %self.id(), host = %host, "Session connected");
        if let Err(e) = deps.store.record_last_connected(&host.id, Utc::now()) {
            tracing::warn!(session = %self.id(), "Failed to record last connection: {:#}", e);
        }
        self.publish(
            SessionEventKind::Status(format!("Connected to {}", host.name)),
            Delivery::Blocking,
        );
        let _ = outcome.send(ConnectOutcome::Connected);

        if self.inner.startup_command.lock().is_some() {
            self.schedule_startup_fallback(deps.config.startup_command_delay());
        }

        self.read_loop(bridge);
    }

    fn read_loop(&self, bridge: Arc<dyn PtyBridge>) {
        loop {
            match bridge.read() {
                Ok(Some(text)) => {
                    self.publish(SessionEventKind::Output(text), Delivery::Blocking);
                    // First output means the shell is up; no-op after that.
                    self.inject_startup_command();
                }
                Ok(None) => {
                    tracing::info!(session = %self.id(), "Remote shell closed the channel");
                    if self.transition(SessionState::Closed, Delivery::Blocking) {
                        self.publish(
                            SessionEventKind::Status("Session closed by remote host".into()),
                            Delivery::Blocking,
                        );
                        self.release_bridge();
                    }
                    return;
                }
                Err(e) => {
                    if self.state().is_terminal() {
                        tracing::debug!(session = %self.id(), "Reader stopped: {}", e);
                        return;
                    }
                    let kind = ssh::classify_io(&e).unwrap_or(ErrorKind::TransportClosedUnexpectedly);
                    tracing::warn!(session = %self.id(), "Read failed: {}", e);
                    self.fail(ConnectError::new(kind, e.to_string()));
                    return;
                }
            }
        }
    }

    /// Move to `Failed` and report it. Returns false if the session had
    /// already finished, in which case nothing is reported.
    fn fail(&self, error: ConnectError) -> bool {
        if !self.transition(SessionState::Failed, Delivery::Blocking) {
            return false;
        }
        self.release_bridge();
        self.publish(
            SessionEventKind::Status(error.user_message()),
            Delivery::Blocking,
        );
        self.publish(SessionEventKind::Failed(error), Delivery::Blocking);
        true
    }

    fn schedule_startup_fallback(&self, delay: Duration) {
        let this = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("tabssh-startup-{}", self.id()))
            .spawn(move || {
                thread::sleep(delay);
                this.inject_startup_command();
            });
        if let Err(e) = spawned {
            tracing::warn!(session = %self.id(), "Startup command timer not started: {}", e);
        }
    }

    /// Send the host's startup command if it has not been sent yet.
    fn inject_startup_command(&self) {
        let Some(command) = self.inner.startup_command.lock().take() else {
            return;
        };
        tracing::debug!(session = %self.id(), "Sending startup command");
        self.execute_command(&command);
    }

    fn release_bridge(&self) {
        let bridge = self.inner.bridge.lock().take();
        if let Some(bridge) = bridge {
            if let Err(e) = bridge.close() {
                tracing::warn!(session = %self.id(), "Error while closing channel: {}", e);
            }
        }
    }

    /// Apply a state change if the state machine allows it, then announce it.
    fn transition(&self, next: SessionState, delivery: Delivery) -> bool {
        {
            let mut state = self.inner.state.lock();
            if !state.can_transition_to(next) {
                return false;
            }
            tracing::debug!(session = %self.id(), "{} -> {}", *state, next);
            *state = next;
        }
        self.publish(SessionEventKind::State(next), delivery);
        true
    }

    fn publish(&self, kind: SessionEventKind, delivery: Delivery) {
        let event = SessionEvent {
            session: self.id(),
            kind,
        };
        let events = &self.inner.deps.events;
        match delivery {
            Delivery::Blocking => {
                // Receiver gone means nobody is listening any more.
                let _ = events.send(event);
            }
            Delivery::BestEffort => match events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(event)) => {
                    tracing::warn!(session = %self.id(), "Event queue full, dropped {:?}", event.kind);
                }
            },
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
