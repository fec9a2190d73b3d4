//! Nullable infrastructure for deterministic testing.
//!
//! The node core takes time as an explicit argument and talks to the network
//! through [`shroud_network::DatagramTransport`]. The types here stand in for
//! the wall clock and the overlay socket:
//! - time only moves when a test moves it
//! - sent frames are recorded instead of written
//! - inbound frames are injected by the test

pub mod clock;
pub mod network;

pub use clock::NullClock;
pub use network::{NullTransport, NullTransportHandle};
