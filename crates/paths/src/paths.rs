//! Where TabSSH keeps its files.
//!
//! Directories are resolved once and cached. `TABSSH_CONFIG_DIR` and
//! `TABSSH_LOG_DIR` override the platform defaults; the `set_*` functions
//! override both, provided they run before first access.

use std::path::PathBuf;
use std::sync::OnceLock;

const APP_DIR: &str = "tabssh";

static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();
static LOGS_DIR: OnceLock<PathBuf> = OnceLock::new();

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// ~/.config/tabssh (or platform equivalent)
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        env_dir("TABSSH_CONFIG_DIR").unwrap_or_else(|| app_dir(dirs::config_dir()))
    })
}

/// ~/Library/Logs/tabssh on macOS, ~/.local/state/tabssh on Linux.
pub fn logs_dir() -> &'static PathBuf {
    LOGS_DIR.get_or_init(|| {
        if let Some(dir) = env_dir("TABSSH_LOG_DIR") {
            return dir;
        }
        if cfg!(target_os = "macos") {
            app_dir(dirs::home_dir().map(|home| home.join("Library").join("Logs")))
        } else {
            app_dir(dirs::state_dir().or_else(dirs::data_local_dir))
        }
    })
}

/// Pin the config dir. No effect after first access.
pub fn set_config_dir(path: PathBuf) {
    let _ = CONFIG_DIR.set(path);
}

/// Pin the logs dir. No effect after first access.
pub fn set_logs_dir(path: PathBuf) {
    let _ = LOGS_DIR.set(path);
}

/// Config file path: config_dir()/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Host list path: config_dir()/hosts.toml
pub fn hosts_file() -> PathBuf {
    config_dir().join("hosts.toml")
}

/// Log file path: logs_dir()/tabssh.log
pub fn log_file() -> PathBuf {
    logs_dir().join("tabssh.log")
}
