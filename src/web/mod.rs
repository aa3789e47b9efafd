//! HTTP/WebSocket front end.
//!
//! - `GET /api/status` - status snapshot as JSON
//! - `WS /ws` - JSON-RPC 2.0 over WebSocket, plus pushed notifications

mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use crate::core::Status;
use crate::rpc::MethodHandler;

/// Shared state for the web server
#[derive(Clone)]
pub struct WebState {
    pub ctx: AppContext,
    pub handler: Arc<MethodHandler>,
}

pub struct WebServer {
    bind_addr: SocketAddr,
    state: WebState,
}

impl WebServer {
    pub fn new(ctx: AppContext, bind_addr: SocketAddr) -> Self {
        let handler = Arc::new(MethodHandler::new(ctx.clone()));
        Self {
            bind_addr,
            state: WebState { ctx, handler },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(status))
            .route("/ws", get(websocket::ws_handler))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "Web server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

async fn status(State(state): State<WebState>) -> Json<Status> {
    Json(state.ctx.status.snapshot().await)
}
