//! Kanban board server.
//!
//! Serves the REST API under `/api` and live updates on `/ws`.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default address 0.0.0.0:5000, board kept in memory
//! cargo run --bin kanban-server
//!
//! # Persist the board between restarts
//! cargo run --bin kanban-server -- --bind 127.0.0.1:8080 --snapshot board.json
//!
//! # Or via environment variables
//! KANBAN_ADDR=127.0.0.1:8080 KANBAN_LOG=debug cargo run --bin kanban-server
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use kanban_server::config::{ServerCliArgs, ServerConfig};
use kanban_server::server::{self, AppState};
use kanban_server::store::{BoardStore, SnapshotWriter};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    let store = match &config.snapshot_path {
        Some(path) => match BoardStore::load(path).await {
            Ok(store) => {
                tracing::info!(path = %path.display(), "board loaded from snapshot");
                store
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load snapshot");
                std::process::exit(1);
            }
        },
        None => BoardStore::new(),
    };
    let store = Arc::new(store);
    let snapshots = SnapshotWriter::new(config.snapshot_path.clone());

    let (state, _worker) =
        AppState::spawn(Arc::clone(&store), config.outbox_capacity, snapshots.clone());

    tracing::info!(addr = %config.bind_addr, "starting kanban server");

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "kanban server listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                }
            }
            snapshots.persist(&store).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start kanban server");
            std::process::exit(1);
        }
    }
}

/// Initializes logging to stdout, or to `file_path` when one is configured.
///
/// The returned [`WorkerGuard`] must be held until shutdown so buffered file
/// output is flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let target = file_path.and_then(|p| Some((p.parent()?, p.file_name()?.to_str()?)));
    let Some((log_dir, file_name)) = target else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();
    Some(guard)
}
