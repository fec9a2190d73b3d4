//! Network messages for shroud node-to-node communication.
//!
//! Two kinds of datagram travel between peers:
//!
//! - **Pings**, a short text frame `<unixMillis>!<height>` used for liveness,
//!   latency sampling and passive catch-up.
//! - **Envelopes**, bincode frames carrying one typed [`Payload`], stamped
//!   with a per-`(type, origin)` sequence number and signed by the origin.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod ping;

pub use codec::{classify, Datagram, MAX_DATAGRAM_SIZE};
pub use envelope::{Envelope, EnvelopeFactory};
pub use error::{DecodeError, EncodeError};
pub use payload::{
    votes_verify, Auth, Challenge, Commit, MessageType, Payload, Vote, CHALLENGE_TOKEN_LEN,
};
pub use ping::Ping;
