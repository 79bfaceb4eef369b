//! Centralized configuration constants for TabSSH.
//!
//! Compile-time defaults and protocol-level values, organized by component.

/// Terminal consumer configuration (cosmetic, forwarded to the renderer).
pub mod terminal {
    /// Default font size in pixels.
    pub const DEFAULT_FONT_SIZE: f32 = 14.0;
    /// Minimum allowed font size.
    pub const MIN_FONT_SIZE: f32 = 8.0;
    /// Maximum allowed font size.
    pub const MAX_FONT_SIZE: f32 = 32.0;
    /// Monospace advance width as a fraction of the font size.
    pub const CELL_WIDTH_RATIO: f32 = 0.6;
    /// Line height as a fraction of the font size.
    pub const LINE_HEIGHT_RATIO: f32 = 1.15;

    /// Default monospace font family (macOS).
    /// Menlo is built-in on all macOS versions since 10.6.
    #[cfg(target_os = "macos")]
    pub const FONT_FAMILY: &str = "Menlo";

    /// Default monospace font family (Windows).
    /// Consolas is built-in on all Windows versions since Vista.
    #[cfg(target_os = "windows")]
    pub const FONT_FAMILY: &str = "Consolas";

    /// Default monospace font family (Linux and others).
    /// "monospace" is the generic font family that always resolves to something.
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    pub const FONT_FAMILY: &str = "monospace";
}

/// Pseudo-terminal negotiation values.
pub mod pty {
    /// Terminal type announced to the remote host.
    pub const TERM_TYPE: &str = "xterm-256color";
    /// Initial grid width in columns.
    pub const DEFAULT_COLUMNS: u16 = 120;
    /// Initial grid height in rows.
    pub const DEFAULT_ROWS: u16 = 40;
    /// Cell width at the default font size.
    pub const CELL_WIDTH_PX: u16 = 8;
    /// Cell height at the default font size.
    pub const CELL_HEIGHT_PX: u16 = 16;
}

/// Connection configuration.
pub mod connection {
    use std::time::Duration;

    /// Default SSH port.
    pub const DEFAULT_PORT: u16 = 22;
    /// Default connect timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
    /// Lower bound for a user-supplied connect timeout.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(500);
}

/// Session lifecycle timing.
pub mod session {
    use std::time::Duration;

    /// Fallback delay before a startup command is injected if the remote
    /// shell has produced no output yet.
    pub const STARTUP_COMMAND_DELAY: Duration = Duration::from_millis(1_000);
    /// Capacity of the bounded session event queue.
    pub const EVENT_QUEUE_CAPACITY: usize = 1024;
    /// Read buffer size for the per-session reader loop.
    pub const READ_BUFFER_SIZE: usize = 8192;
}

/// Scrollback buffer configuration.
pub mod scrollback {
    /// Default scrollback buffer size in lines.
    pub const DEFAULT_LINES: usize = 10_000;
    /// Maximum allowed scrollback buffer size in lines.
    pub const MAX_LINES: usize = 100_000;
}

/// Settings file validation limits.
pub mod settings {
    /// Maximum settings file size in bytes (64 KB).
    /// Settings files should be tiny; anything larger is suspicious.
    pub const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Maximum length for string fields (font family).
    pub const MAX_STRING_LENGTH: usize = 256;
}
