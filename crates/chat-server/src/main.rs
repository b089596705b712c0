//! chatd — the multi-user chat server.
//!
//! # Usage
//!
//! ```bash
//! chatd                    # Start on the default port (8888)
//! chatd 9999               # Use a specific TCP port
//! chatd 9999 1800          # Override the session idle timeout too
//! ```
//!
//! # Architecture
//!
//! `main` loads configuration, opens the SQLite-backed account/message
//! store, binds the listener, and then just runs the accept loop: every
//! connection gets its own worker task (`worker::handle_connection`),
//! each with a dedicated writer task fed by that connection's channel
//! (see `worker`). There is no further coordination at this layer — the
//! session registry and the database are the only shared state, both
//! reached through `AppState`.

use anyhow::{Context, Result};
use chat_core::config::ServerConfig;
use chat_core::session::SessionRegistry;
use chat_core::store::Database;
use chatd::{AppState, Listener};
use clap::Parser;
use std::time::Duration;
use tracing::info;

/// chatd — multi-user TCP chat server.
#[derive(Parser, Debug)]
#[command(name = "chatd", about = "Multi-user TCP chat server")]
struct Cli {
    /// TCP port to listen on. Overrides config.toml for this run.
    port: Option<u16>,

    /// Seconds a session may sit idle before it expires. Overrides
    /// config.toml for this run.
    session_timeout_seconds: Option<u64>,

    /// Path to the configuration file.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Path to the SQLite database file.
    #[arg(long)]
    db: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ServerConfig::config_file_path().context("could not determine config directory")?,
    };
    let mut config = ServerConfig::load_from(&config_path).context("failed to load config")?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(timeout) = cli.session_timeout_seconds {
        config.session_timeout_secs = timeout;
    }

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => config.resolved_db_path().context("could not determine data directory")?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Database::open(&db_path).context("failed to open database")?;
    info!(path = %db_path.display(), "database opened");

    let sessions = SessionRegistry::new(config.session_capacity, Duration::from_secs(config.session_timeout_secs));
    let state = AppState::new(db, sessions);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let server = Listener::bind(&bind_addr).await.context("failed to bind TCP listener")?;
    info!(port = server.port(), "chat server started");

    server.accept_loop(state).await;
    Ok(())
}

/// Sets up a layered subscriber writing to stderr and to a log file
/// under the platform data directory. The log level is controlled by
/// the `CHATD_LOG` environment variable, defaulting to `info`.
fn init_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_env("CHATD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file_layer = ServerConfig::data_dir()
        .and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            let log_path = dir.join("chatd.log");
            std::fs::OpenOptions::new().create(true).append(true).open(log_path).ok()
        })
        .map(|file| fmt::layer().with_writer(std::sync::Mutex::new(file)).with_ansi(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}
