//! The signed, sequenced unit of network communication.

use std::collections::HashMap;

use bincode::Options;
use serde::{Deserialize, Serialize};
use shroud_crypto::{verify_signature, Wallet};
use shroud_types::{PublicKey, Signature};

use crate::codec::{options, MAX_DATAGRAM_SIZE};
use crate::error::{DecodeError, EncodeError};
use crate::payload::{MessageType, Payload};

/// A payload wrapped with its origin, sequence number and ident.
///
/// `sig` is the origin's signature over every other field, so a relay can
/// neither rewrite `seq` nor swap the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Creator of the message, not the relay that forwarded it.
    pub origin: PublicKey,
    /// Strictly increasing per `(type, origin)`.
    pub seq: u64,
    pub ident: String,
    /// Whether relays should re-gossip.
    pub broadcast: bool,
    pub payload: Payload,
    pub sig: Signature,
}

impl Envelope {
    pub fn msg_type(&self) -> MessageType {
        self.payload.msg_type()
    }

    pub fn is_from(&self, pk: &PublicKey) -> bool {
        &self.origin == pk
    }

    pub fn verify_signature(&self) -> bool {
        match signing_bytes(&self.origin, self.seq, &self.ident, self.broadcast, &self.payload) {
            Ok(msg) => verify_signature(&msg, &self.sig, &self.origin),
            Err(_) => false,
        }
    }

    /// Canonical serialization; `parse(pack(e)) == e`.
    pub fn pack(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(options().serialize(self)?)
    }

    pub fn parse(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.is_empty() {
            return Err(DecodeError::Empty);
        }
        if frame.len() > MAX_DATAGRAM_SIZE {
            return Err(DecodeError::TooLarge {
                size: frame.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        options()
            .deserialize(frame)
            .map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

fn signing_bytes(
    origin: &PublicKey,
    seq: u64,
    ident: &str,
    broadcast: bool,
    payload: &Payload,
) -> Result<Vec<u8>, EncodeError> {
    Ok(bincode::serialize(&(origin, seq, ident, broadcast, payload))?)
}

/// Creates envelopes for the local node and owns its sequence counters.
///
/// The next sequence number for a type is `max(previous + 1, now_ms)`: a
/// restarted node resumes above anything it sent before without persisting
/// its counters.
#[derive(Default)]
pub struct EnvelopeFactory {
    last_seq: HashMap<MessageType, u64>,
}

impl EnvelopeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        wallet: &dyn Wallet,
        payload: Payload,
        now_ms: u64,
    ) -> Result<Envelope, EncodeError> {
        let msg_type = payload.msg_type();
        let prev = self.last_seq.get(&msg_type).copied().unwrap_or(0);
        let seq = (prev + 1).max(now_ms);
        let origin = wallet.public_key();
        let ident = payload.ident();
        let broadcast = msg_type.is_broadcast();
        let sig = wallet.sign(&signing_bytes(&origin, seq, &ident, broadcast, &payload)?);
        self.last_seq.insert(msg_type, seq);
        Ok(Envelope {
            origin,
            seq,
            ident,
            broadcast,
            payload,
            sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Challenge;
    use shroud_crypto::KeyWallet;

    fn challenge(token: &str) -> Payload {
        Payload::Challenge(Challenge {
            token: token.to_string(),
        })
    }

    #[test]
    fn sequence_is_strictly_increasing_per_type() {
        let wallet = KeyWallet::from_seed(&[1; 32]);
        let mut factory = EnvelopeFactory::new();
        let a = factory.create(&wallet, challenge("a"), 1_000).unwrap();
        let b = factory.create(&wallet, challenge("b"), 1_000).unwrap();
        let c = factory.create(&wallet, challenge("c"), 900).unwrap();
        assert_eq!(a.seq, 1_000);
        assert_eq!(b.seq, 1_001);
        assert_eq!(c.seq, 1_002);
    }

    #[test]
    fn pack_parse_roundtrip_and_signature() {
        let wallet = KeyWallet::from_seed(&[1; 32]);
        let env = EnvelopeFactory::new()
            .create(&wallet, challenge("tok"), 5)
            .unwrap();
        let parsed = Envelope::parse(&env.pack().unwrap()).unwrap();
        assert_eq!(parsed, env);
        assert!(parsed.verify_signature());
        assert!(!parsed.broadcast);
    }

    #[test]
    fn rewritten_seq_breaks_signature() {
        let wallet = KeyWallet::from_seed(&[1; 32]);
        let mut env = EnvelopeFactory::new()
            .create(&wallet, challenge("tok"), 5)
            .unwrap();
        env.seq += 1;
        assert!(!env.verify_signature());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Envelope::parse(&[]), Err(DecodeError::Empty));
        assert!(matches!(
            Envelope::parse(&[0xff; 40]),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::parse(&vec![0u8; MAX_DATAGRAM_SIZE + 1]),
            Err(DecodeError::TooLarge { .. })
        ));
    }

    #[test]
    fn parse_rejects_trailing_bytes() {
        let wallet = KeyWallet::from_seed(&[1; 32]);
        let env = EnvelopeFactory::new()
            .create(&wallet, challenge("tok"), 5)
            .unwrap();
        let mut frame = env.pack().unwrap();
        frame.push(0);
        assert!(Envelope::parse(&frame).is_err());
    }
}
