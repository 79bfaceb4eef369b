//! Configuration system for TabSSH.
//!
//! Provides compile-time constants and TOML config file support. The config
//! is loaded once at startup and handed to the session core by value.

pub mod constants;
pub mod file;

pub use file::{ensure_config_file, load_config, load_config_from, Config, RendererKind};
