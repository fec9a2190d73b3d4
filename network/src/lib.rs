//! P2P networking layer for the shroud node.
//!
//! The [`NetworkEngine`] is a synchronous state machine: it is fed inbound
//! datagrams and clock ticks, and it fills an outbox of frames for the
//! runtime to write to the [`DatagramTransport`]. It never blocks and never
//! awaits, which keeps every mutation of peer and replay state on a single
//! path. The async pieces (socket I/O, HTTP fetch, bootstrap polling) live in
//! `transport`, `fetch` and `bootstrap` and report back through channels.

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod gossip;
pub mod ping;
pub mod replay;
pub mod schedule;
pub mod sync;
pub mod transport;

pub use bootstrap::{poll_bootstrap, BOOTSTRAP_POLL_INTERVAL};
pub use engine::{
    Admission, DropReason, EngineConfig, Inbound, NetworkEngine, Outbound, PeerStatus, Readiness,
};
pub use error::NetworkError;
pub use fetch::ApiFetcher;
pub use gossip::GossipOrder;
pub use ping::{ping_window, LatencyWindow, PingRejection, PingTracker};
pub use replay::{GossipEntry, SequenceGuard};
pub use schedule::Schedule;
pub use sync::{catch_up_blocks, catch_up_range};
pub use transport::{DatagramTransport, UdpTransport};
