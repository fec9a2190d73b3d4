//! Outbound API fetch with peer fallback.
//!
//! Absolute `http://` endpoints are fetched directly. Relative endpoints are
//! tried against the API address of each known peer in random order until
//! one answers; every call is bounded by the client timeout and optionally
//! routed through a SOCKS proxy into the overlay.

use std::time::Duration;

use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use shroud_store::Peer;

use crate::NetworkError;

#[derive(Clone)]
pub struct ApiFetcher {
    client: reqwest::Client,
    /// Our own API address, never used as a fallback candidate.
    self_http: String,
}

impl ApiFetcher {
    pub fn new(
        timeout: Duration,
        socks_proxy: Option<&str>,
        self_http: impl Into<String>,
    ) -> Result<Self, NetworkError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = socks_proxy {
            let proxy = reqwest::Proxy::all(format!("socks5h://{proxy}"))
                .map_err(|e| NetworkError::FetchFailed(format!("proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| NetworkError::FetchFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            self_http: self_http.into(),
        })
    }

    /// Fetch `endpoint` and decode it as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        peers: &[Peer],
    ) -> Result<T, NetworkError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return self.get(endpoint).await;
        }

        let mut candidates: Vec<&Peer> = peers
            .iter()
            .filter(|p| !p.http.is_empty() && p.http != self.self_http)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());

        let path = endpoint.trim_start_matches('/');
        for peer in candidates {
            let url = format!("http://{}/{}", peer.http, path);
            match self.get(&url).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    tracing::debug!(peer = %peer.public_key.short(), url, error = %e, "peer fetch failed");
                }
            }
        }
        Err(NetworkError::FetchFailed(format!("no peer answered {endpoint}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NetworkError::FetchFailed(format!("{url}: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| NetworkError::FetchFailed(format!("{url}: {e}")))
    }
}
