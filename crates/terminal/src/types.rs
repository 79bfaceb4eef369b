//! Core types shared by bridges, consumers and channel providers.

use alacritty_terminal::grid::Dimensions;
use settings::constants::{pty, terminal};
use settings::Config;
use std::fmt;
use std::io::{self, Read, Write};

/// Terminal dimensions in cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl TermSize {
    /// Size with pixel dimensions for the default font.
    pub fn from_cells(cols: u16, rows: u16) -> Self {
        Self::with_cell_size(cols, rows, (pty::CELL_WIDTH_PX, pty::CELL_HEIGHT_PX))
    }

    /// Size with pixel dimensions derived from a `(width, height)` cell size.
    pub fn with_cell_size(cols: u16, rows: u16, cell: (u16, u16)) -> Self {
        Self {
            cols,
            rows,
            pixel_width: cols.saturating_mul(cell.0),
            pixel_height: rows.saturating_mul(cell.1),
        }
    }

    /// Size for the font configured in `config`.
    pub fn for_config(cols: u16, rows: u16, config: &Config) -> Self {
        Self::with_cell_size(cols, rows, config.cell_size())
    }

    /// Explicit size, as reported by a host view.
    pub fn new(cols: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        Self {
            cols,
            rows,
            pixel_width,
            pixel_height,
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::from_cells(pty::DEFAULT_COLUMNS, pty::DEFAULT_ROWS)
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines()
    }

    fn screen_lines(&self) -> usize {
        usize::from(self.rows.max(1))
    }

    fn columns(&self) -> usize {
        usize::from(self.cols.max(1))
    }
}

/// Font a consumer renders with.
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub size: f32,
}

impl Font {
    /// The configured family at the clamped size.
    pub fn from_config(config: &Config) -> Self {
        Self {
            family: config.font_family.clone(),
            size: config.clamped_font_size(),
        }
    }
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: terminal::FONT_FAMILY.to_string(),
            size: terminal::DEFAULT_FONT_SIZE,
        }
    }
}

impl fmt::Display for Font {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}pt", self.family, self.size)
    }
}

/// Out-of-band operations on an open shell channel.
///
/// Implementations must make `close` unblock a reader that is waiting on
/// the channel's byte stream.
pub trait ChannelControl: Send + Sync {
    /// Forward a window-size change to the remote side.
    fn resize(&self, size: TermSize) -> io::Result<()>;
    /// Whether the underlying transport is still usable.
    fn is_open(&self) -> bool;
    /// Tear the channel down.
    fn close(&self) -> io::Result<()>;
}

/// An opened interactive shell with a granted PTY.
///
/// The two byte streams are independent so a reader thread can block on
/// `reader` while other threads write.
pub struct ShellChannel {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub control: Box<dyn ChannelControl>,
}

impl ShellChannel {
    pub fn new(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        control: impl ChannelControl + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            control: Box::new(control),
        }
    }
}

impl fmt::Debug for ShellChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellChannel")
            .field("open", &self.control.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_size_matches_initial_grid() {
        let size = TermSize::default();
        assert_eq!((size.cols, size.rows), (120, 40));
        assert_eq!((size.pixel_width, size.pixel_height), (960, 640));
    }

    #[test]
    fn from_cells_derives_pixels() {
        let size = TermSize::from_cells(200, 50);
        assert_eq!(size, TermSize::new(200, 50, 1600, 800));
    }

    #[test]
    fn config_font_scales_pixels() {
        let config = Config {
            font_size: 28.0,
            ..Config::default()
        };
        assert_eq!(
            TermSize::for_config(100, 30, &config),
            TermSize::new(100, 30, 1700, 960)
        );
        assert_eq!(
            TermSize::for_config(100, 30, &Config::default()),
            TermSize::from_cells(100, 30)
        );
    }

    #[test]
    fn font_uses_clamped_size() {
        let config = Config {
            font_family: "Iosevka".to_string(),
            font_size: 99.0,
            ..Config::default()
        };
        let font = Font::from_config(&config);
        assert_eq!(font.size, 32.0);
        assert_eq!(font.to_string(), "Iosevka 32pt");
    }

    #[test]
    fn dimensions_never_report_zero() {
        let size = TermSize::new(0, 0, 0, 0);
        assert_eq!(size.columns(), 1);
        assert_eq!(size.screen_lines(), 1);
    }

    #[test]
    fn display_is_cols_by_rows() {
        assert_eq!(TermSize::from_cells(80, 24).to_string(), "80x24");
    }
}
