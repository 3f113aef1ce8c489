//! umbrad - session manager daemon for eclipsing-binary modeling workers.
//!
//! Spawns one worker process per session on a reserved loopback port and
//! proxies commands to it over the HTTP API. Configuration is loaded once
//! from `~/.config/umbra/umbrad.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8420"
//!
//! [port_pool]
//! start = 9000
//! end = 9100
//!
//! [session]
//! idle_timeout_secs = 1800
//!
//! [worker]
//! binary = "umbra-worker"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use umbra::api::{AppState, create_router};
use umbra::audit::{NullObserver, SessionObserver, SqliteAudit};
use umbra::config::ConfigFile;
use umbra::session::{SessionManager, SysinfoScanner};

#[derive(Parser, Debug)]
#[command(name = "umbrad", about = "Session manager for modeling workers")]
struct Args {
    /// Path to config file.
    /// Defaults to ~/.config/umbra/umbrad.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address for the HTTP API (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "umbra=debug,umbrad=debug,tower_http=debug"
    } else {
        "umbra=info,umbrad=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = ConfigFile::load(args.config);
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    // The audit store is a collaborator: if it cannot be opened the server
    // still runs, it just stops recording.
    let observer: Arc<dyn SessionObserver> =
        match SqliteAudit::connect(&config.audit_db_path()).await {
            Ok(audit) => Arc::new(audit),
            Err(e) => {
                warn!("Audit store unavailable, events will not be recorded: {:#}", e);
                Arc::new(NullObserver)
            }
        };

    let manager = SessionManager::new(
        (config.port_pool.start, config.port_pool.end),
        config.worker_command(),
        config.session_settings(),
        observer,
        Arc::new(SysinfoScanner),
    );

    // A previous run may have crashed and left workers holding ports.
    let reclaimed = manager.reclaim_orphans();
    if reclaimed > 0 {
        info!("Reclaimed {} orphaned worker(s) from a previous run", reclaimed);
    }

    let reaper = manager.spawn_reaper();

    let app = create_router(AppState {
        manager: Arc::clone(&manager),
    });
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding HTTP listener on {}", bind))?;
    info!("umbrad listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP API")?;

    // Shutdown: stop the reaper, then tear every session down so all ports
    // and worker processes are released before the process exits.
    reaper.abort();
    let ended = manager.shutdown_all().await;
    if ended > 0 {
        info!("Shut down {} active session(s)", ended);
    }
    info!("umbrad shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, closing all sessions");
}
