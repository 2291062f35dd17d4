use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::hub::ReportHub;
use super::ws;
use crate::config::CommandSpec;
use crate::errors::ChannelError;
use crate::runner::CommandRunner;

/// State shared by every request the dashboard server handles.
pub struct ChannelState {
    pub hub: ReportHub,
    pub runner: Arc<CommandRunner>,
    pub commands: Arc<[CommandSpec]>,
    pub shutdown: CancellationToken,
}

/// Build the router: socket endpoint, health probe and snapshot.
pub fn build_router(state: Arc<ChannelState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(snapshot_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn snapshot_handler(State(state): State<Arc<ChannelState>>) -> impl IntoResponse {
    Json(state.hub.snapshot())
}

/// A running dashboard server.
///
/// Dropping the handle does not stop the server; call [`BroadcastChannel::close`].
pub struct BroadcastChannel {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: Option<JoinHandle<()>>,
}

impl BroadcastChannel {
    /// Bind `addr` and start serving viewers in the background.
    pub async fn start(
        addr: &str,
        hub: ReportHub,
        runner: Arc<CommandRunner>,
        commands: Vec<CommandSpec>,
    ) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ChannelError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ChannelError::LocalAddr)?;

        let shutdown = CancellationToken::new();
        let state = Arc::new(ChannelState {
            hub,
            runner,
            commands: commands.into(),
            shutdown: shutdown.clone(),
        });
        let app = build_router(state);

        let signal = shutdown.clone().cancelled_owned();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                warn!("[jarvis] dashboard server error: {}", e);
            }
            info!("[jarvis] dashboard closed");
        });

        info!("[jarvis] dashboard listening on ws://{}/ws", local_addr);

        Ok(Self {
            local_addr,
            shutdown,
            server: Some(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting viewers and disconnect the current ones.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the server task has finished. Returns immediately if it
    /// was already awaited.
    pub async fn wait_closed(&mut self) {
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}
