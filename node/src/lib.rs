//! The shroud node.
//!
//! Wires the lower crates into a running member of the network:
//! - [`ShroudNode`] moves datagrams through the network engine, the
//!   validator and the consensus driver against the in-memory chain
//! - [`NodeRuntime`] drives it from the datagram transport, the clock and
//!   API requests arriving through a [`NodeHandle`]
//! - joins, configuration, key files, logging, metrics and shutdown

pub mod config;
pub mod error;
pub mod join;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod runtime;
pub mod shutdown;

pub use config::NodeConfig;
pub use error::NodeError;
pub use join::{is_address, ChallengeAnswer, ChallengeRequest, JoinAccepted, JoinRegistry};
pub use keys::{load_or_create_api_token, load_wallet};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{ShroudNode, DEFAULT_PAGE_SIZE, MAX_BLOCK_QUERY, MAX_PAGE_SIZE};
pub use runtime::{NodeHandle, NodeRequest, NodeRuntime};
pub use shutdown::ShutdownController;
