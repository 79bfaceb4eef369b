//! TabSSH - several SSH shells, one prompt.
//!
//! Main entry point for the command-line front end.

mod app;
mod commands;
mod hosts;

use anyhow::{bail, Context, Result};
use app::App;
use clap::Parser;
use session::SessionRegistry;
use settings::RendererKind;
use ssh::SshConnectionFactory;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use tokio_bridge::TokioBridge;
use tracing::{debug, error, info};

#[derive(Debug, Parser)]
#[command(name = "tabssh", version, about = "Run several SSH shells from one prompt")]
struct Cli {
    /// Config file (default: ~/.config/tabssh/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Saved host list (default: ~/.config/tabssh/hosts.toml)
    #[arg(long, value_name = "PATH")]
    hosts: Option<PathBuf>,

    /// Terminal strategy, overriding the config file
    #[arg(long, value_name = "emulator|raw")]
    renderer: Option<RendererKind>,

    /// Identity file for ad-hoc targets
    #[arg(short = 'i', long = "identity", value_name = "KEY")]
    identity: Option<PathBuf>,

    /// Saved host id or name, or user@host[:port]
    #[arg(value_name = "TARGET", required = true)]
    targets: Vec<String>,
}

/// Initialize required directories.
fn init_paths() -> Result<()> {
    let config_dir = tabssh_paths::config_dir();
    let logs_dir = tabssh_paths::logs_dir();

    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;
    Ok(())
}

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("TABSSH_DEBUG").is_ok()
}

/// Initialize the logging system.
///
/// Logs go to a file: stdout carries the remote shells.
fn init_logging() {
    use std::sync::Mutex;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if is_debug_mode() {
        "tabssh=trace,session=trace,ssh=trace,terminal=debug,russh=debug,info"
    } else {
        "tabssh=info,session=info,ssh=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let layer = fmt::layer().with_target(true).with_line_number(true).with_ansi(false);
    let log_file = tabssh_paths::log_file();
    match std::fs::OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(layer.with_writer(Mutex::new(file)))
            .with(filter)
            .init(),
        Err(e) => {
            eprintln!("Could not open log file {:?}: {}", log_file, e);
            tracing_subscriber::registry()
                .with(layer.with_writer(std::io::stderr))
                .with(filter)
                .init()
        }
    }

    if is_debug_mode() {
        info!(
            "TabSSH v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
        info!("Set RUST_LOG for custom log levels, e.g. RUST_LOG=session=trace");
    } else {
        info!("TabSSH v{} starting up", env!("CARGO_PKG_VERSION"));
    }
}

/// Forward stdin lines to the loop. Dropping the sender signals end of input.
fn spawn_input_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("tabssh-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn input thread")?;
    Ok(rx)
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => settings::load_config_from(path),
        None => {
            settings::ensure_config_file();
            settings::load_config()
        }
    };
    if let Some(renderer) = cli.renderer {
        config.renderer = renderer;
    }
    let config = Arc::new(config);
    debug!(?config, "Loaded config");

    let hosts_path = cli.hosts.clone().unwrap_or_else(tabssh_paths::hosts_file);
    let saved = hosts::load_hosts(&hosts_path)?;
    let targets = cli
        .targets
        .iter()
        .map(|target| {
            hosts::resolve_target(
                target,
                &saved,
                cli.identity.as_deref(),
                config.default_port,
            )
        })
        .collect::<Result<Vec<_>>>()?;
    if targets.is_empty() {
        bail!("no targets given");
    }

    let runtime = TokioBridge::new().context("Failed to start async runtime")?;
    let factory = Arc::new(SshConnectionFactory::new(runtime, &config));
    let store = Arc::new(hosts::TomlHostStore::new(hosts_path));
    let mut registry = SessionRegistry::new(factory, store, config.clone());
    let events = registry
        .take_events()
        .context("Session events already taken")?;

    let mut app = App::new(registry, config, std::io::stdout());
    for host in targets {
        app.open(host)?;
    }
    // Start on the first tab.
    if let Some(first) = app.registry().at(0).map(|s| s.id()) {
        app.registry_mut().activate(first)?;
    }
    println!("Type :help for commands.");

    let lines = spawn_input_reader()?;
    app.run(&events, &lines)?;
    app.registry_mut().disconnect_all();
    info!("TabSSH exiting");
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_paths() {
        eprintln!("Failed to initialize paths: {e:#}");
    }
    init_logging();

    if let Err(e) = run(cli) {
        error!("{e:#}");
        eprintln!("tabssh: {e:#}");
        std::process::exit(1);
    }
}
