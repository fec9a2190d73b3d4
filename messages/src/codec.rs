//! Frame classification and the bincode options envelopes are packed with.

use bincode::Options;

use crate::envelope::Envelope;
use crate::error::DecodeError;
use crate::ping::Ping;

/// Largest frame a node sends or accepts.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A classified inbound datagram.
#[derive(Debug)]
pub enum Datagram {
    Ping(Ping),
    Message(Envelope),
}

pub(crate) fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_DATAGRAM_SIZE as u64)
        .reject_trailing_bytes()
}

/// Split inbound traffic into pings and envelopes.
pub fn classify(frame: &[u8]) -> Result<Datagram, DecodeError> {
    if Ping::matches(frame) {
        Ping::parse(frame).map(Datagram::Ping)
    } else {
        Envelope::parse(frame).map(Datagram::Message)
    }
}
