//! Axum-based API server.

use axum::routing::{get, put};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::RpcError;
use crate::handlers::{self, ApiState};

/// All API routes over `state`.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/join/:http/:udp/:public_key", get(handlers::join))
        .route("/challenge/:token", get(handlers::challenge))
        .route("/network", get(handlers::network))
        .route("/peers", get(handlers::peers))
        .route("/gossip", get(handlers::gossip))
        .route("/stack/transactions", get(handlers::stack_transactions))
        .route("/pool/transactions", get(handlers::pool_transactions))
        .route("/pool/blocks", get(handlers::pool_blocks))
        .route("/pool/votes", get(handlers::pool_votes))
        .route("/pool/commits", get(handlers::pool_commits))
        .route("/block/genesis", get(handlers::genesis))
        .route("/block/latest", get(handlers::latest))
        .route("/sync/:height", get(handlers::sync))
        .route("/blocks", get(handlers::blocks))
        .route("/blocks/page", get(handlers::block_page))
        .route("/blocks/page/:page", get(handlers::block_page))
        .route("/transaction/:origin/:ident", get(handlers::transaction))
        .route("/transaction", put(handlers::put_transaction))
        .route("/transaction/:ident", put(handlers::put_transaction))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct RpcServer {
    pub bind: String,
    pub state: ApiState,
}

impl RpcServer {
    pub fn new(bind: impl Into<String>, state: ApiState) -> Self {
        Self {
            bind: bind.into(),
            state,
        }
    }

    /// Serve until `shutdown_rx` fires.
    pub async fn serve(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let listener = tokio::net::TcpListener::bind(&self.bind)
            .await
            .map_err(|e| RpcError::Server(format!("bind {}: {e}", self.bind)))?;
        tracing::info!(address = %self.bind, "API server listening");
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .map_err(|e| RpcError::Server(e.to_string()))
    }
}
