//! Network bootstrap discovery.
//!
//! A node that knows no reachable peers polls a well-known endpoint for the
//! current network snapshot until it gets a non-empty list.

use std::time::Duration;

use shroud_store::Peer;
use tokio::sync::broadcast;

use crate::fetch::ApiFetcher;

pub const BOOTSTRAP_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poll `{bootstrap_url}/network` every `interval` until it returns peers.
/// Returns `None` if shutdown is signalled first.
pub async fn poll_bootstrap(
    fetcher: ApiFetcher,
    bootstrap_url: String,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Option<Vec<Peer>> {
    let url = format!("{}/network", bootstrap_url.trim_end_matches('/'));
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return None,
            _ = ticker.tick() => {
                match fetcher.fetch_json::<Vec<Peer>>(&url, &[]).await {
                    Ok(peers) if !peers.is_empty() => {
                        tracing::info!(url, peers = peers.len(), "bootstrap snapshot received");
                        return Some(peers);
                    }
                    Ok(_) => tracing::debug!(url, "bootstrap snapshot empty"),
                    Err(e) => tracing::warn!(url, error = %e, "bootstrap poll failed"),
                }
            }
        }
    }
}
