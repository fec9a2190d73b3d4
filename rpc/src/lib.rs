//! HTTP API of the shroud node.
//!
//! Read-only views of the network, the pools and the chain, the join
//! challenge routes, token-guarded transaction submission and Prometheus
//! metrics. Handlers talk to the node only through a
//! [`shroud_node::NodeHandle`].

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use handlers::{ApiState, API_TOKEN_HEADER};
pub use server::{router, RpcServer};
