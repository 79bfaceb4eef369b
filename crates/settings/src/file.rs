//! TOML config file support.
//!
//! Config location: `~/.config/tabssh/config.toml`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

/// Which terminal strategy a session uses for its output.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    /// Full escape-sequence emulation; bytes are handed over untouched.
    #[default]
    Emulator,
    /// Plain-text fallback that strips control sequences itself.
    Raw,
}

impl std::str::FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emulator" => Ok(Self::Emulator),
            "raw" => Ok(Self::Raw),
            other => Err(format!("unknown renderer '{other}' (expected emulator or raw)")),
        }
    }
}

/// User-facing config parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Terminal font family.
    pub font_family: String,
    /// Terminal font size in points.
    pub font_size: f32,
    /// Maximum number of scrollback lines.
    pub scrollback_lines: usize,
    /// Connect timeout in milliseconds. The only timeout in the session core.
    pub connect_timeout_ms: u64,
    /// Port used for host entries that do not name one.
    pub default_port: u16,
    /// Terminal strategy for new sessions.
    pub renderer: RendererKind,
    /// Initial PTY width in columns.
    pub initial_columns: u16,
    /// Initial PTY height in rows.
    pub initial_rows: u16,
    /// Fallback delay before a host's startup command is injected.
    pub startup_command_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            font_family: constants::terminal::FONT_FAMILY.to_string(),
            font_size: constants::terminal::DEFAULT_FONT_SIZE,
            scrollback_lines: constants::scrollback::DEFAULT_LINES,
            connect_timeout_ms: constants::connection::DEFAULT_TIMEOUT.as_millis() as u64,
            default_port: constants::connection::DEFAULT_PORT,
            renderer: RendererKind::default(),
            initial_columns: constants::pty::DEFAULT_COLUMNS,
            initial_rows: constants::pty::DEFAULT_ROWS,
            startup_command_delay_ms: constants::session::STARTUP_COMMAND_DELAY.as_millis()
                as u64,
        }
    }
}

impl Config {
    /// Connect timeout, never below the configured minimum.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms).max(constants::connection::MIN_TIMEOUT)
    }

    /// Fallback delay for startup-command injection.
    pub fn startup_command_delay(&self) -> Duration {
        Duration::from_millis(self.startup_command_delay_ms)
    }

    /// Scrollback size clamped to the supported maximum.
    pub fn scrollback(&self) -> usize {
        self.scrollback_lines.min(constants::scrollback::MAX_LINES)
    }

    /// Font size clamped to the supported range.
    pub fn clamped_font_size(&self) -> f32 {
        self.font_size.clamp(
            constants::terminal::MIN_FONT_SIZE,
            constants::terminal::MAX_FONT_SIZE,
        )
    }

    /// Cell size in pixels for the clamped font size, as (width, height).
    ///
    /// Used to fill in the pixel fields of PTY size requests.
    pub fn cell_size(&self) -> (u16, u16) {
        let size = self.clamped_font_size();
        let width = (size * constants::terminal::CELL_WIDTH_RATIO).round() as u16;
        let height = (size * constants::terminal::LINE_HEIGHT_RATIO).round() as u16;
        (width.max(1), height.max(1))
    }

    /// Initial grid size, substituting defaults for zero values.
    pub fn initial_grid(&self) -> (u16, u16) {
        let cols = if self.initial_columns == 0 {
            constants::pty::DEFAULT_COLUMNS
        } else {
            self.initial_columns
        };
        let rows = if self.initial_rows == 0 {
            constants::pty::DEFAULT_ROWS
        } else {
            self.initial_rows
        };
        (cols, rows)
    }

    fn sanitized(mut self) -> Self {
        if self.font_family.len() > constants::settings::MAX_STRING_LENGTH {
            tracing::warn!(
                "font-family longer than {} characters, using default",
                constants::settings::MAX_STRING_LENGTH
            );
            self.font_family = constants::terminal::FONT_FAMILY.to_string();
        }
        self
    }
}

/// Default config file content with comments (generated on first launch).
const DEFAULT_CONFIG: &str = r#"# TabSSH Configuration

# Terminal font family (forwarded to the renderer)
font-family = "FONT_PLACEHOLDER"

# Terminal font size in points
font-size = 14

# Maximum scrollback buffer size (lines)
scrollback-lines = 10000

# How long to wait for a host to accept the connection (milliseconds)
connect-timeout-ms = 30000

# Port used for hosts that do not specify one
default-port = 22

# Output strategy: "emulator" (full terminal emulation) or "raw" (plain text)
renderer = "emulator"

# Initial terminal size negotiated with the remote host
initial-columns = 120
initial-rows = 40

# If a host has a startup command, it is sent once the shell prints its first
# output. If the shell stays silent, it is sent after this delay (milliseconds).
startup-command-delay-ms = 1000
"#;

/// Return the config file path.
pub fn config_path() -> PathBuf {
    tabssh_paths::config_file()
}

/// Ensure the config file exists, creating a default if missing.
/// Returns the path to the config file.
pub fn ensure_config_file() -> Option<PathBuf> {
    let path = config_path();
    if !path.exists() {
        let parent = path.parent()?;
        std::fs::create_dir_all(parent).ok()?;

        let content = DEFAULT_CONFIG.replace("FONT_PLACEHOLDER", constants::terminal::FONT_FAMILY);
        std::fs::write(&path, content).ok()?;
        tracing::info!("Created default config at {:?}", path);
    }
    Some(path)
}

/// Load and parse the default config file. Returns default on any error.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load and parse a config file. Falls back to defaults, with a warning,
/// when the file is unreadable, oversized or malformed. A missing file is
/// silently the defaults.
pub fn load_config_from(path: &Path) -> Config {
    match read_bounded(path) {
        Ok(Some(content)) => match toml::from_str::<Config>(&content) {
            Ok(cfg) => cfg.sanitized(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to parse config: {}", e);
                Config::default()
            }
        },
        Ok(None) => Config::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read config: {}", e);
            Config::default()
        }
    }
}

/// File contents, `None` if the file does not exist.
fn read_bounded(path: &Path) -> std::io::Result<Option<String>> {
    let len = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if len > constants::settings::MAX_FILE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("file too large ({len} bytes)"),
        ));
    }
    std::fs::read_to_string(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = Config::default();
        assert_eq!(cfg.font_size, 14.0);
        assert_eq!(cfg.connect_timeout_ms, 30_000);
        assert_eq!(cfg.default_port, 22);
        assert_eq!(cfg.renderer, RendererKind::Emulator);
        assert_eq!(cfg.initial_grid(), (120, 40));
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg: Config = toml::from_str(r#"renderer = "raw""#).unwrap();
        assert_eq!(cfg.renderer, RendererKind::Raw);
        assert_eq!(cfg.font_size, 14.0);
    }

    #[test]
    fn parses_full_toml() {
        let toml_str = r#"
font-family = "JetBrains Mono"
font-size = 16
scrollback-lines = 5000
connect-timeout-ms = 5000
default-port = 2222
renderer = "emulator"
initial-columns = 200
initial-rows = 50
startup-command-delay-ms = 250
"#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.font_family, "JetBrains Mono");
        assert_eq!(cfg.font_size, 16.0);
        assert_eq!(cfg.scrollback(), 5000);
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(cfg.default_port, 2222);
        assert_eq!(cfg.initial_grid(), (200, 50));
        assert_eq!(cfg.startup_command_delay(), Duration::from_millis(250));
    }

    #[test]
    fn ignores_unknown_keys() {
        let toml_str = r#"
renderer = "raw"
theme = "whatever"
"#;
        let result: Result<Config, _> = toml::from_str(toml_str);
        assert!(result.is_ok());
    }

    #[test]
    fn default_config_template_is_valid_toml() {
        let content = DEFAULT_CONFIG.replace("FONT_PLACEHOLDER", "Menlo");
        let cfg: Config = toml::from_str(&content).unwrap();
        assert_eq!(cfg.font_family, "Menlo");
        assert_eq!(cfg, Config {
            font_family: "Menlo".to_string(),
            ..Config::default()
        });
    }

    #[test]
    fn empty_string_parses_to_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn timeout_is_clamped_to_minimum() {
        let cfg: Config = toml::from_str("connect-timeout-ms = 1").unwrap();
        assert_eq!(cfg.connect_timeout(), constants::connection::MIN_TIMEOUT);
    }

    #[test]
    fn scrollback_is_clamped_to_maximum() {
        let cfg: Config = toml::from_str("scrollback-lines = 9999999").unwrap();
        assert_eq!(cfg.scrollback(), constants::scrollback::MAX_LINES);
    }

    #[test]
    fn default_font_gives_nominal_cell_size() {
        assert_eq!(
            Config::default().cell_size(),
            (constants::pty::CELL_WIDTH_PX, constants::pty::CELL_HEIGHT_PX)
        );
    }

    #[test]
    fn cell_size_follows_font_size() {
        let config: Config = toml::from_str("font-size = 28").unwrap();
        assert_eq!(config.cell_size(), (17, 32));

        // Out-of-range sizes are clamped before deriving metrics.
        let tiny: Config = toml::from_str("font-size = 1").unwrap();
        assert_eq!(tiny.cell_size(), (5, 9));
    }

    #[test]
    fn zero_grid_falls_back_to_defaults() {
        let cfg: Config = toml::from_str("initial-columns = 0\ninitial-rows = 0").unwrap();
        assert_eq!(
            cfg.initial_grid(),
            (constants::pty::DEFAULT_COLUMNS, constants::pty::DEFAULT_ROWS)
        );
    }

    #[test]
    fn unknown_renderer_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str(r#"renderer = "gpu""#);
        assert!(result.is_err());
    }

    #[test]
    fn renderer_from_str() {
        assert_eq!("RAW".parse::<RendererKind>(), Ok(RendererKind::Raw));
        assert_eq!("emulator".parse::<RendererKind>(), Ok(RendererKind::Emulator));
        assert!("gpu".parse::<RendererKind>().is_err());
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("missing.toml"));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_invalid_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "font-size = \"huge\"").unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn load_oversized_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let padding = "#".repeat(constants::settings::MAX_FILE_SIZE as usize + 1);
        std::fs::write(&path, format!("renderer = \"raw\"\n{padding}")).unwrap();
        assert_eq!(load_config_from(&path), Config::default());
    }

    #[test]
    fn load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "renderer = \"raw\"\nconnect-timeout-ms = 2000").unwrap();
        let cfg = load_config_from(&path);
        assert_eq!(cfg.renderer, RendererKind::Raw);
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn overlong_font_family_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let long = "x".repeat(constants::settings::MAX_STRING_LENGTH + 1);
        std::fs::write(&path, format!("font-family = \"{long}\"")).unwrap();
        assert_eq!(
            load_config_from(&path).font_family,
            constants::terminal::FONT_FAMILY
        );
    }
}
