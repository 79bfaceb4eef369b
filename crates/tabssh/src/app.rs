//! The tab host loop.
//!
//! Owns the registry and one terminal consumer per session. Everything here
//! runs on the main thread: session events and typed lines are interleaved
//! through [`App::run`].

use crate::commands::{self, Command};
use collections::FxHashMap;
use session::{SessionEvent, SessionEventKind, SessionId, SessionRegistry};
use settings::Config;
use ssh::HostDescriptor;
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use terminal::{consumer_for, TermSize, TerminalConsumer};

/// How long the loop waits for a session event before polling input.
const TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct Tab {
    consumer: Box<dyn TerminalConsumer>,
    title: Option<String>,
}

pub struct App<W: Write> {
    registry: SessionRegistry,
    config: Arc<Config>,
    tabs: FxHashMap<SessionId, Tab>,
    out: W,
}

impl<W: Write> App<W> {
    pub fn new(registry: SessionRegistry, config: Arc<Config>, out: W) -> Self {
        Self {
            registry,
            config,
            tabs: FxHashMap::default(),
            out,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    /// Open a tab for `host`. Progress arrives as events.
    pub fn open(&mut self, host: HostDescriptor) -> io::Result<()> {
        let name = host.name.clone();
        match self.registry.open(host) {
            Ok(attempt) => {
                tracing::info!(session = %attempt.session(), host = %name, "Opened tab");
                Ok(())
            }
            Err(e) => writeln!(self.out, "[{name}] {e}"),
        }
    }

    /// Drive the loop until `:quit`, end of input, or every tab is gone.
    pub fn run(
        &mut self,
        events: &Receiver<SessionEvent>,
        lines: &Receiver<String>,
    ) -> io::Result<()> {
        loop {
            match events.recv_timeout(TICK) {
                Ok(event) => {
                    self.handle_event(event)?;
                    while let Ok(event) = events.try_recv() {
                        self.handle_event(event)?;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }

            match lines.try_recv() {
                Ok(line) => {
                    if self.handle_line(&line)? == Flow::Quit {
                        return Ok(());
                    }
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Input closed");
                    return Ok(());
                }
            }

            if self.registry.is_empty() {
                writeln!(self.out, "No sessions left.")?;
                return Ok(());
            }
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> io::Result<()> {
        let label = self.label(event.session);
        match &event.kind {
            SessionEventKind::Status(text) => writeln!(self.out, "[{label}] {text}")?,
            SessionEventKind::State(state) => {
                tracing::debug!(session = %event.session, %state, "State changed");
            }
            SessionEventKind::Output(text) => self.on_output(event.session, &label, text)?,
            SessionEventKind::Failed(error) => {
                tracing::error!(session = %event.session, kind = %error.kind, "{}", error.message);
            }
        }

        if let Some(session) = self.registry.apply(&event) {
            self.tabs.remove(&session.id());
            writeln!(self.out, "[{label}] tab closed")?;
        }
        self.out.flush()
    }

    fn on_output(&mut self, id: SessionId, label: &str, text: &str) -> io::Result<()> {
        // Output still queued from a tab that was closed or reconnected.
        let Some(session) = self.registry.get(id) else {
            tracing::trace!(session = %id, "Dropping output for removed session");
            return Ok(());
        };
        let active = self.registry.active_id() == Some(id);

        let config = &self.config;
        let tab = self.tabs.entry(id).or_insert_with(|| Tab {
            consumer: new_consumer(config),
            title: None,
        });
        tab.consumer.consume(text);

        for reply in tab.consumer.take_replies() {
            if let Err(e) = session.write(reply.as_bytes()) {
                tracing::warn!(session = %id, "Terminal reply not sent: {}", e);
            }
        }

        let title = tab.consumer.title();
        if title.is_some() && title != tab.title {
            writeln!(self.out, "[{label}] title: {}", title.as_deref().unwrap_or_default())?;
            tab.title = title;
        }

        // The active tab's BEL reaches the real terminal with its text.
        if tab.consumer.take_bell() && !active {
            writeln!(self.out, "[{label}] bell")?;
        }

        if active {
            self.out.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    pub fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let command = match commands::parse(line) {
            Ok(command) => command,
            Err(message) => {
                writeln!(self.out, "{message}")?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::Send(text) => {
                let sent = self
                    .registry
                    .active()
                    .map(|session| (session.id(), session.try_execute_command(&text)));
                match sent {
                    Some((_, Ok(()))) => {}
                    Some((id, Err(e))) => {
                        let label = self.label(id);
                        writeln!(self.out, "[{label}] {e}")?;
                    }
                    None => writeln!(self.out, "No active session")?,
                }
            }
            Command::List => self.list()?,
            Command::Switch(n) => match self.registry.at(n - 1).map(|s| s.id()) {
                Some(id) => {
                    self.registry.activate(id).map_err(io::Error::other)?;
                    self.show_screen(id)?;
                }
                None => writeln!(self.out, "No tab {n}")?,
            },
            Command::Next => {
                if let Some(id) = self.registry.activate_next() {
                    self.show_screen(id)?;
                }
            }
            Command::Prev => {
                if let Some(id) = self.registry.activate_previous() {
                    self.show_screen(id)?;
                }
            }
            Command::Broadcast(text) => {
                let report = self.registry.broadcast(&text);
                write!(
                    self.out,
                    "Sent to {} session(s), skipped {}",
                    report.delivered.len(),
                    report.skipped.len()
                )?;
                if report.is_complete() {
                    writeln!(self.out)?;
                } else {
                    writeln!(self.out, ", failed {}", report.failed.len())?;
                    for (id, error) in &report.failed {
                        let label = self.label(*id);
                        writeln!(self.out, "  [{label}] {error}")?;
                    }
                }
            }
            Command::Key(key) => {
                let sent = self
                    .registry
                    .active()
                    .map(|session| (session.id(), session.send_key(key)));
                if let Some((id, Err(e))) = sent {
                    let label = self.label(id);
                    writeln!(self.out, "[{label}] {e}")?;
                }
            }
            Command::Resize { cols, rows } => {
                if let Some(id) = self.registry.active_id() {
                    let size = TermSize::for_config(cols, rows, &self.config);
                    if let Some(session) = self.registry.get(id) {
                        session.resize(size.cols, size.rows, size.pixel_width, size.pixel_height);
                    }
                    if let Some(tab) = self.tabs.get_mut(&id) {
                        tab.consumer.resize(size);
                    }
                }
            }
            Command::Screen => {
                if let Some(id) = self.registry.active_id() {
                    self.show_screen(id)?;
                }
            }
            Command::Reconnect => {
                if let Some(id) = self.registry.active_id() {
                    self.tabs.remove(&id);
                    if let Err(e) = self.registry.reconnect(id) {
                        writeln!(self.out, "Reconnect failed: {e}")?;
                    }
                }
            }
            Command::Close => {
                if let Some(id) = self.registry.active_id() {
                    let label = self.label(id);
                    self.tabs.remove(&id);
                    self.registry.close(id);
                    writeln!(self.out, "[{label}] tab closed")?;
                }
            }
            Command::Help => writeln!(self.out, "{}", commands::HELP)?,
            Command::Quit => {
                self.registry.disconnect_all();
                self.tabs.clear();
                return Ok(Flow::Quit);
            }
        }
        self.out.flush()?;
        Ok(Flow::Continue)
    }

    fn list(&mut self) -> io::Result<()> {
        if self.registry.is_empty() {
            return writeln!(self.out, "No sessions");
        }
        let active = self.registry.active_id();
        for (index, session) in self.registry.sessions().enumerate() {
            let marker = if Some(session.id()) == active { '*' } else { ' ' };
            let host = session
                .host()
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".to_string());
            let title = self
                .tabs
                .get(&session.id())
                .and_then(|tab| tab.title.as_deref())
                .map(|t| format!("  \"{t}\""))
                .unwrap_or_default();
            writeln!(
                self.out,
                "{marker}{:>2} {} {host} [{}]{title}",
                index + 1,
                session.id(),
                session.state()
            )?;
        }
        Ok(())
    }

    fn show_screen(&mut self, id: SessionId) -> io::Result<()> {
        let label = self.label(id);
        match self.tabs.get(&id) {
            Some(tab) => {
                let consumer = &tab.consumer;
                writeln!(self.out, "--- {label} ({}, {}) ---", consumer.size(), consumer.font())?;
                writeln!(self.out, "{}", consumer.screen_text())
            }
            None => writeln!(self.out, "--- {label} ---\n(no output yet)"),
        }
    }

    /// `N:name` for a tab, or the short id once it has been removed.
    fn label(&self, id: SessionId) -> String {
        let Some(session) = self.registry.get(id) else {
            return id.short();
        };
        let name = session.host().map(|h| h.name).unwrap_or_default();
        match self.registry.position(id) {
            Some(index) => format!("{}:{name}", index + 1),
            None => name,
        }
    }
}

fn new_consumer(config: &Config) -> Box<dyn TerminalConsumer> {
    let (cols, rows) = config.initial_grid();
    consumer_for(config, cols, rows)
}
