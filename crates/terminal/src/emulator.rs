//! Full terminal emulation backed by `alacritty_terminal`.
//!
//! Escape sequences are parsed into a grid with scrollback. Events the
//! terminal raises (title changes, bell, replies destined for the remote
//! shell) are captured by an [`EventProxy`] and drained by the session owner.

use crate::consumer::TerminalConsumer;
use crate::types::{Font, TermSize};
use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi::Processor;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct EventState {
    title: Option<String>,
    bell: bool,
    pty_writes: Vec<String>,
}

/// Captures terminal events. Cloned into the `Term`, so state is shared.
#[derive(Clone, Default)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        let mut state = self.state.lock();
        match event {
            Event::Title(title) => state.title = Some(title),
            Event::ResetTitle => state.title = None,
            Event::Bell => state.bell = true,
            Event::PtyWrite(data) => state.pty_writes.push(data),
            _ => {}
        }
    }
}

/// Terminal emulator consumer.
pub struct EmulatorConsumer {
    term: Term<EventProxy>,
    processor: Processor,
    events: EventProxy,
    size: TermSize,
    font: Font,
}

impl EmulatorConsumer {
    pub fn new(size: TermSize, scrollback: usize) -> Self {
        let config = Config {
            scrolling_history: scrollback,
            ..Config::default()
        };
        let events = EventProxy::default();
        let term = Term::new(config, &size, events.clone());

        Self {
            term,
            processor: Processor::new(),
            events,
            size,
            font: Font::default(),
        }
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }
}

impl TerminalConsumer for EmulatorConsumer {
    fn consume(&mut self, text: &str) {
        self.processor.advance(&mut self.term, text.as_bytes());
    }

    fn resize(&mut self, size: TermSize) {
        self.size = size;
        self.term.resize(size);
    }

    fn size(&self) -> TermSize {
        self.size
    }

    fn font(&self) -> &Font {
        &self.font
    }

    fn screen_text(&self) -> String {
        let grid = self.term.grid();
        let mut lines: Vec<String> = (0..grid.screen_lines())
            .map(|row| {
                let row = &grid[Line(row as i32)];
                let line: String = (0..grid.columns()).map(|col| row[Column(col)].c).collect();
                line.trim_end().to_string()
            })
            .collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }

    fn take_replies(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events.state.lock().pty_writes)
    }

    fn title(&self) -> Option<String> {
        self.events.state.lock().title.clone()
    }

    fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.events.state.lock().bell)
    }
}
