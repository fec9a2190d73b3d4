//! Node configuration with TOML file support.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shroud_consensus::{DriverConfig, QuorumPolicy, DEFAULT_QUORUM_BPS};
use shroud_network::EngineConfig;

use crate::NodeError;

const MIN_NETWORK_SIZE: usize = 7;
const MAX_NETWORK_SIZE: usize = 64;
const MIN_MORPH_INTERVAL_MS: u64 = 120_000;
const MAX_MORPH_INTERVAL_MS: u64 = 600_000;
const KEY_FILE: &str = "node.key";

/// Configuration for a shroud node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically. Call [`NodeConfig::normalized`] before use; the derived
/// intervals are only filled in there.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Advertised datagram address of this node.
    #[serde(default = "default_address")]
    pub address: String,

    /// Local socket the datagram transport binds to.
    #[serde(default = "default_udp_bind")]
    pub udp_bind: String,

    /// Advertised API address of this node.
    #[serde(default = "default_http")]
    pub http: String,

    /// Local socket the API server binds to.
    #[serde(default = "default_http")]
    pub http_bind: String,

    /// Base URL polled for a network snapshot when no peer is reachable.
    #[serde(default)]
    pub bootstrap: Option<String>,

    /// SOCKS proxy for outbound API fetches.
    #[serde(default)]
    pub socks_proxy: Option<String>,

    #[serde(default = "default_path_genesis")]
    pub path_genesis: PathBuf,

    /// Directory holding the node key.
    #[serde(default = "default_path_keys")]
    pub path_keys: PathBuf,

    #[serde(default = "default_path_api_token")]
    pub path_api_token: PathBuf,

    #[serde(default = "default_network_size")]
    pub network_size: usize,

    #[serde(default = "default_refresh_interval")]
    pub network_refresh_interval_ms: u64,

    /// Lifetime of a pending join. Defaults to five refresh intervals.
    #[serde(default)]
    pub network_auth_timeout_ms: Option<u64>,

    #[serde(default = "default_ping_interval")]
    pub network_ping_interval_ms: u64,

    /// Age after which stale proposals are abandoned. Defaults to
    /// `network_size × network_ping_interval_ms × 2`.
    #[serde(default)]
    pub network_clean_interval_ms: Option<u64>,

    #[serde(default = "default_morph_interval")]
    pub network_morph_interval_ms: u64,

    /// Blocks pushed per catch-up reply.
    #[serde(default = "default_sync_size")]
    pub network_sync_size: u64,

    /// How far a peer must lag before it is sent catch-up blocks.
    #[serde(default = "default_sync_threshold")]
    pub network_sync_threshold: u64,

    #[serde(default)]
    pub network_verbose_logging: bool,

    #[serde(default = "default_fetch_timeout")]
    pub network_fetch_timeout_ms: u64,

    /// How often the transaction stack is checked for a new proposal.
    #[serde(default = "default_block_pool_check_interval")]
    pub block_pool_check_interval_ms: u64,

    /// Stake share required for a quorum, in basis points.
    #[serde(default = "default_quorum_bps")]
    pub quorum_bps: u32,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "127.0.0.1:17468".into()
}
fn default_udp_bind() -> String {
    "0.0.0.0:17468".into()
}
fn default_http() -> String {
    "127.0.0.1:17469".into()
}
fn default_path_genesis() -> PathBuf {
    PathBuf::from("genesis/block.json")
}
fn default_path_keys() -> PathBuf {
    PathBuf::from("keys")
}
fn default_path_api_token() -> PathBuf {
    PathBuf::from("keys/api-token")
}
fn default_network_size() -> usize {
    MIN_NETWORK_SIZE
}
fn default_refresh_interval() -> u64 {
    3_000
}
fn default_ping_interval() -> u64 {
    2_000
}
fn default_morph_interval() -> u64 {
    MIN_MORPH_INTERVAL_MS
}
fn default_sync_size() -> u64 {
    10
}
fn default_sync_threshold() -> u64 {
    1
}
fn default_fetch_timeout() -> u64 {
    5_000
}
fn default_block_pool_check_interval() -> u64 {
    10_000
}
fn default_quorum_bps() -> u32 {
    DEFAULT_QUORUM_BPS
}
fn default_log_format() -> String {
    "human".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl NodeConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Clamp every value into its supported range and fill in the derived
    /// intervals.
    pub fn normalized(mut self) -> Self {
        self.network_size = self.network_size.clamp(MIN_NETWORK_SIZE, MAX_NETWORK_SIZE);
        self.network_morph_interval_ms = self
            .network_morph_interval_ms
            .clamp(MIN_MORPH_INTERVAL_MS, MAX_MORPH_INTERVAL_MS);
        self.network_refresh_interval_ms = self.network_refresh_interval_ms.max(1);
        self.network_ping_interval_ms = self.network_ping_interval_ms.max(1);
        self.network_sync_size = self.network_sync_size.max(1);
        self.network_sync_threshold = self.network_sync_threshold.max(1);
        self.network_fetch_timeout_ms = self.network_fetch_timeout_ms.max(1);
        self.block_pool_check_interval_ms = self.block_pool_check_interval_ms.max(1);
        self.network_auth_timeout_ms = Some(
            self.network_auth_timeout_ms
                .unwrap_or(self.network_refresh_interval_ms * 5)
                .max(1),
        );
        self.network_clean_interval_ms = Some(
            self.network_clean_interval_ms
                .unwrap_or(self.network_size as u64 * self.network_ping_interval_ms * 2)
                .max(1),
        );
        self.quorum_bps = QuorumPolicy::new(self.quorum_bps).bps();
        self
    }

    pub fn key_file(&self) -> PathBuf {
        self.path_keys.join(KEY_FILE)
    }

    pub fn auth_timeout_ms(&self) -> u64 {
        self.network_auth_timeout_ms
            .unwrap_or(self.network_refresh_interval_ms * 5)
    }

    pub fn clean_interval_ms(&self) -> u64 {
        self.network_clean_interval_ms
            .unwrap_or(self.network_size as u64 * self.network_ping_interval_ms * 2)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ping_interval_ms: self.network_ping_interval_ms,
            morph_interval_ms: self.network_morph_interval_ms,
            sync_threshold: self.network_sync_threshold,
            sync_size: self.network_sync_size,
            verbose: self.network_verbose_logging,
            ..EngineConfig::default()
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            propose_interval_ms: self.block_pool_check_interval_ms,
            proposal_timeout_ms: self.clean_interval_ms(),
            cleanup_interval_ms: self.clean_interval_ms(),
            quorum: QuorumPolicy::new(self.quorum_bps),
            ..DriverConfig::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            udp_bind: default_udp_bind(),
            http: default_http(),
            http_bind: default_http(),
            bootstrap: None,
            socks_proxy: None,
            path_genesis: default_path_genesis(),
            path_keys: default_path_keys(),
            path_api_token: default_path_api_token(),
            network_size: default_network_size(),
            network_refresh_interval_ms: default_refresh_interval(),
            network_auth_timeout_ms: None,
            network_ping_interval_ms: default_ping_interval(),
            network_clean_interval_ms: None,
            network_morph_interval_ms: default_morph_interval(),
            network_sync_size: default_sync_size(),
            network_sync_threshold: default_sync_threshold(),
            network_verbose_logging: false,
            network_fetch_timeout_ms: default_fetch_timeout(),
            block_pool_check_interval_ms: default_block_pool_check_interval(),
            quorum_bps: default_quorum_bps(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
