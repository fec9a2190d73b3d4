//! API error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shroud_node::NodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not found")]
    NotFound,

    /// Missing API token, refused join or refused transaction.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("node unavailable")]
    NodeUnavailable,

    #[error("node error: {0}")]
    Node(NodeError),

    #[error("server error: {0}")]
    Server(String),
}

impl From<NodeError> for RpcError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Stopped => RpcError::NodeUnavailable,
            NodeError::InvalidRequest(reason) => RpcError::InvalidRequest(reason),
            other => RpcError::Node(other),
        }
    }
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::NotFound => StatusCode::NOT_FOUND,
            RpcError::Forbidden(_) => StatusCode::FORBIDDEN,
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::NodeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::Node(_) | RpcError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "API request failed");
        } else {
            tracing::debug!(error = %self, "API request refused");
        }
        // bodies stay empty; clients only look at the status
        status.into_response()
    }
}
