//! Terminal consumers: whatever turns session text into something visible.

use crate::emulator::EmulatorConsumer;
use crate::types::{Font, TermSize};
use settings::{Config, RendererKind};
use std::collections::VecDeque;

/// Receives a session's output, in arrival order, on one thread.
pub trait TerminalConsumer: Send {
    /// Feed a chunk of output text.
    fn consume(&mut self, text: &str);

    /// Apply a new grid size.
    fn resize(&mut self, size: TermSize);

    /// Current grid size.
    fn size(&self) -> TermSize;

    /// Font the output is rendered with.
    fn font(&self) -> &Font;

    /// Visible screen contents, one line per row, trailing blanks trimmed.
    fn screen_text(&self) -> String;

    /// Replies the terminal wants sent back to the remote shell (cursor
    /// position reports, device attributes). Drained on each call.
    fn take_replies(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Window title set by the remote side, if any.
    fn title(&self) -> Option<String> {
        None
    }

    /// Whether the remote side rang the bell since the last call.
    fn take_bell(&mut self) -> bool {
        false
    }
}

/// Build the consumer for the configured renderer, sized for its font.
pub fn consumer_for(config: &Config, cols: u16, rows: u16) -> Box<dyn TerminalConsumer> {
    let size = TermSize::for_config(cols, rows, config);
    let font = Font::from_config(config);
    match config.renderer {
        RendererKind::Emulator => {
            Box::new(EmulatorConsumer::new(size, config.scrollback()).with_font(font))
        }
        RendererKind::Raw => {
            Box::new(PlainTextConsumer::new(size, config.scrollback()).with_font(font))
        }
    }
}

/// Keeps a bounded history of already-stripped text lines.
pub struct PlainTextConsumer {
    size: TermSize,
    font: Font,
    lines: VecDeque<String>,
    current: String,
    max_lines: usize,
}

impl PlainTextConsumer {
    pub fn new(size: TermSize, max_lines: usize) -> Self {
        Self {
            size,
            font: Font::default(),
            lines: VecDeque::new(),
            current: String::new(),
            max_lines: max_lines.max(1),
        }
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }
}

impl TerminalConsumer for PlainTextConsumer {
    fn consume(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '\n' => {
                    let line = std::mem::take(&mut self.current);
                    self.lines.push_back(line);
                    if self.lines.len() > self.max_lines {
                        self.lines.pop_front();
                    }
                }
                '\r' => {}
                '\x08' => {
                    self.current.pop();
                }
                c => self.current.push(c),
            }
        }
    }

    fn resize(&mut self, size: TermSize) {
        self.size = size;
    }

    fn size(&self) -> TermSize {
        self.size
    }

    fn font(&self) -> &Font {
        &self.font
    }

    fn screen_text(&self) -> String {
        let rows = usize::from(self.size.rows.max(1));
        let mut visible: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        visible.push(&self.current);
        let start = visible.len().saturating_sub(rows);
        visible[start..]
            .iter()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
