//! Shared server state, router assembly and startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::task::JoinHandle;

use crate::notify::{self, DEFAULT_OUTBOX_CAPACITY};
use crate::rooms::{EventSink, RoomRegistry};
use crate::service::BoardService;
use crate::store::{BoardStore, SnapshotWriter};
use crate::{api, ws};

/// State shared by every request handler and socket.
pub struct AppState {
    /// Board operations.
    pub service: BoardService,
    /// Live project rooms.
    pub rooms: Arc<RoomRegistry>,
}

/// Handle to [`AppState`] passed to axum.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wires the service to a store and spawns the notification worker.
    ///
    /// The worker stops once the returned state (and every clone of its
    /// service) has been dropped. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        store: Arc<BoardStore>,
        outbox_capacity: usize,
        snapshots: SnapshotWriter,
    ) -> (SharedState, JoinHandle<()>) {
        let rooms = Arc::new(RoomRegistry::new());
        let sink: Arc<dyn EventSink> = rooms.clone();
        let (notifier, jobs) = notify::outbox(outbox_capacity);
        let worker = tokio::spawn(notify::run_outbox(
            jobs,
            Arc::clone(&store),
            Arc::clone(&sink),
            snapshots.clone(),
        ));
        let service = BoardService::new(store, sink, notifier, snapshots);
        (Arc::new(Self { service, rooms }), worker)
    }

    /// In-memory state with default settings.
    #[must_use]
    pub fn in_memory() -> SharedState {
        Self::spawn(
            Arc::new(BoardStore::new()),
            DEFAULT_OUTBOX_CAPACITY,
            SnapshotWriter::default(),
        )
        .0
    }
}

/// Builds the full router: REST API, WebSocket endpoint and health check.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .with_state(state)
}

/// Starts a server with fresh in-memory state.
///
/// Returns the bound address (useful with port 0) and the server task.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn start_server(
    addr: &str,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    start_server_with_state(addr, AppState::in_memory()).await
}

/// Starts a server with the given state.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn start_server_with_state(
    addr: &str,
    state: SharedState,
) -> Result<(SocketAddr, JoinHandle<()>), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}
