//! Flash daemon - builds firmware submitted from the block editor.
//!
//! A single Rust binary that provides:
//! - HTTP API for selecting a board and a destination per session
//! - Build requests that compile the source and deploy the binary
//! - WebSocket for live build progress

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flash_core::config::CONFIG_FILE;
use flash_core::FlashConfig;
use flash_daemon::server::{create_router, AppState};

/// How often expired sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Firmware build-and-deploy daemon
#[derive(Parser, Debug)]
#[command(name = "flashd")]
#[command(about = "Builds firmware submitted from the block editor and deploys it to a device")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults to ./flashd.toml)
    #[arg(short, long, env = "FLASHD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides server.listen)
    #[arg(short, long, env = "FLASHD_LISTEN")]
    listen: Option<String>,

    /// Build workspace directory (overrides workspace.root)
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Toolchain executable (overrides toolchain.program)
    #[arg(long)]
    toolchain: Option<String>,

    /// Toolchain timeout in seconds (overrides toolchain.timeout_secs)
    #[arg(long)]
    timeout: Option<u64>,

    /// Fail on configuration errors instead of falling back to defaults
    #[arg(long)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> Result<FlashConfig> {
    let path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = if cli.strict {
        FlashConfig::load_strict(&path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        FlashConfig::load(&path)
    };

    if let Some(listen) = &cli.listen {
        config.server.listen = listen.clone();
    }
    if let Some(workspace) = &cli.workspace {
        config.workspace.root = workspace.clone();
    }
    if let Some(program) = &cli.toolchain {
        config.toolchain.program = program.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.toolchain.timeout_secs = timeout;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = load_config(&cli)?;

    info!("Workspace: {}", config.workspace.root.display());
    info!(
        "Toolchain: {} {:?} (timeout {}s)",
        config.toolchain.program, config.toolchain.args, config.toolchain.timeout_secs
    );

    let state = AppState::new(&config);

    // Sweep expired sessions
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                info!("Purged {} expired sessions", purged);
            }
        }
    });

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!("flashd listening on http://{}", config.server.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
