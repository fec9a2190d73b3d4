//! API request handlers.
//!
//! Read routes return JSON views of the node. `PUT /transaction` and the
//! join routes are the only ones that change node state.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use shroud_ledger::{Block, Command, Transaction};
use shroud_node::{ChallengeAnswer, JoinAccepted, NodeHandle, NodeMetrics, NodeError};
use shroud_types::PublicKey;

use crate::error::RpcError;

/// Header carrying the token that authorizes write routes.
pub const API_TOKEN_HEADER: &str = "api-token";

#[derive(Clone)]
pub struct ApiState {
    pub node: NodeHandle,
    pub api_token: Arc<str>,
    pub metrics: Arc<NodeMetrics>,
}

impl ApiState {
    pub fn new(node: NodeHandle, api_token: impl Into<Arc<str>>, metrics: Arc<NodeMetrics>) -> Self {
        Self {
            node,
            api_token: api_token.into(),
            metrics,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(API_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|t| tokens_match(t, &self.api_token))
    }
}

/// Equality without an early exit on the first differing byte.
fn tokens_match(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn parse_key(s: &str) -> Result<PublicKey, RpcError> {
    s.parse()
        .map_err(|e| RpcError::InvalidRequest(format!("public key: {e}")))
}

// ── Join ────────────────────────────────────────────────────────────────

pub async fn join(
    State(state): State<ApiState>,
    Path((http, udp, public_key)): Path<(String, String, String)>,
) -> Result<Json<JoinAccepted>, RpcError> {
    let public_key = parse_key(&public_key)?;
    match state.node.join(public_key, udp, http).await {
        Ok(accepted) => Ok(Json(accepted)),
        Err(NodeError::Join(reason)) => Err(RpcError::Forbidden(reason)),
        Err(e) => Err(e.into()),
    }
}

pub async fn challenge(
    State(state): State<ApiState>,
    Path(token): Path<String>,
) -> Result<Json<ChallengeAnswer>, RpcError> {
    match state.node.challenge(token).await {
        Ok(answer) => Ok(Json(answer)),
        Err(NodeError::InvalidRequest(reason)) => Err(RpcError::Forbidden(reason)),
        Err(e) => Err(e.into()),
    }
}

// ── Network ─────────────────────────────────────────────────────────────

pub async fn network(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.node.network().await?))
}

pub async fn peers(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.node.peers().await?))
}

pub async fn gossip(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.node.gossip().await?))
}

// ── Pools ───────────────────────────────────────────────────────────────

pub async fn stack_transactions(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Transaction>>, RpcError> {
    Ok(Json(state.node.stack().await?))
}

pub async fn pool_transactions(
    State(state): State<ApiState>,
) -> Result<Json<Vec<Transaction>>, RpcError> {
    Ok(Json(state.node.pool_transactions().await?))
}

pub async fn pool_blocks(State(state): State<ApiState>) -> Result<Json<Vec<Block>>, RpcError> {
    Ok(Json(state.node.pool_blocks().await?))
}

pub async fn pool_votes(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.node.pool_votes().await?))
}

pub async fn pool_commits(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    Ok(Json(state.node.pool_commits().await?))
}

// ── Chain ───────────────────────────────────────────────────────────────

pub async fn genesis(State(state): State<ApiState>) -> Result<Json<Block>, RpcError> {
    Ok(Json(state.node.genesis().await?))
}

pub async fn latest(State(state): State<ApiState>) -> Result<Json<Block>, RpcError> {
    Ok(Json(state.node.latest().await?))
}

pub async fn sync(
    State(state): State<ApiState>,
    Path(height): Path<String>,
) -> Result<Json<Vec<Block>>, RpcError> {
    let height: u64 = height.parse().map_err(|_| RpcError::NotFound)?;
    state
        .node
        .sync(height)
        .await?
        .map(Json)
        .ok_or(RpcError::NotFound)
}

#[derive(Debug, Default, Deserialize)]
pub struct BlocksQuery {
    #[serde(default)]
    pub gte: u64,
    #[serde(default)]
    pub lte: u64,
    #[serde(default)]
    pub limit: u64,
}

pub async fn blocks(
    State(state): State<ApiState>,
    Query(q): Query<BlocksQuery>,
) -> Result<Json<Vec<Block>>, RpcError> {
    Ok(Json(state.node.blocks(q.gte, q.lte, q.limit).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub size: u64,
}

pub async fn block_page(
    State(state): State<ApiState>,
    page: Option<Path<u64>>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Vec<Block>>, RpcError> {
    let page = page.map_or(1, |Path(p)| p);
    Ok(Json(state.node.block_page(page, q.size).await?))
}

pub async fn transaction(
    State(state): State<ApiState>,
    Path((origin, ident)): Path<(String, String)>,
) -> Result<Json<Transaction>, RpcError> {
    let origin = parse_key(&origin).map_err(|_| RpcError::NotFound)?;
    state
        .node
        .transaction(origin, ident)
        .await?
        .map(Json)
        .ok_or(RpcError::NotFound)
}

/// Sign `commands` with the node wallet and stack them. Requires the API
/// token; any refusal is reported as 403.
pub async fn put_transaction(
    State(state): State<ApiState>,
    ident: Option<Path<String>>,
    headers: HeaderMap,
    Json(commands): Json<Vec<Command>>,
) -> Result<Json<Transaction>, RpcError> {
    if !state.authorized(&headers) {
        return Err(RpcError::Forbidden("bad API token".into()));
    }
    let ident = ident.map(|Path(i)| i);
    match state.node.submit(commands, ident).await {
        Ok(tx) => Ok(Json(tx)),
        Err(NodeError::Stopped) => Err(RpcError::NodeUnavailable),
        Err(e) => Err(RpcError::Forbidden(e.to_string())),
    }
}

// ── Metrics ─────────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<ApiState>) -> Result<impl IntoResponse, RpcError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
