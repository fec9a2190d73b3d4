//! Admission of new peers.
//!
//! A joiner asks a member to `join` with its API address, datagram address
//! and public key. The member records a pending join under a fresh challenge
//! token, fetches `http://{http}/challenge/{token}` from the joiner, and
//! expects a packed Auth envelope signing that token. A matching answer
//! turns into an `AddPeer` transaction stacked by the member.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shroud_crypto::random_token;
use shroud_messages::{Envelope, Payload, CHALLENGE_TOKEN_LEN};
use shroud_store::PeerDirectory;
use shroud_types::PublicKey;

use crate::NodeError;

/// Body of a `/challenge/{token}` answer: the hex-encoded Auth envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeAnswer {
    pub token: String,
}

/// Body of a successful `/join` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAccepted {
    pub address: String,
    pub public_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingJoin {
    pub public_key: PublicKey,
    pub address: String,
    pub http: String,
    pub expires_at: u64,
}

/// A join the member must now challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub token: String,
    pub url: String,
}

#[derive(Debug)]
pub struct JoinRegistry {
    pending: HashMap<String, PendingJoin>,
    timeout_ms: u64,
}

/// `host:port` with a numeric port and no path or scheme.
pub fn is_address(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty()
                && !host.contains('/')
                && !host.contains(char::is_whitespace)
                && port.parse::<u16>().is_ok_and(|p| p > 0)
        }
        None => false,
    }
}

impl JoinRegistry {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            timeout_ms,
        }
    }

    /// Record a join request. Fails for malformed addresses, for keys that
    /// are already peers and for keys with a join in flight.
    pub fn register(
        &mut self,
        public_key: PublicKey,
        address: &str,
        http: &str,
        directory: &dyn PeerDirectory,
        now: u64,
    ) -> Result<ChallengeRequest, NodeError> {
        self.expire(now);
        if !is_address(address) || !is_address(http) {
            return Err(NodeError::Join(format!("malformed address {address} / {http}")));
        }
        if directory.peer(&public_key).is_some() {
            return Err(NodeError::Join(format!("{} is already a peer", public_key.short())));
        }
        if self.pending.values().any(|p| p.public_key == public_key) {
            return Err(NodeError::Join(format!("{} has a join in flight", public_key.short())));
        }

        let token = random_token(CHALLENGE_TOKEN_LEN);
        self.pending.insert(
            token.clone(),
            PendingJoin {
                public_key,
                address: address.to_string(),
                http: http.to_string(),
                expires_at: now + self.timeout_ms,
            },
        );
        Ok(ChallengeRequest {
            url: format!("http://{http}/challenge/{token}"),
            token,
        })
    }

    /// Consume a pending join and check the joiner's answer against it.
    pub fn complete(
        &mut self,
        token: &str,
        answer: &ChallengeAnswer,
        now: u64,
    ) -> Result<PendingJoin, NodeError> {
        self.expire(now);
        let pending = self
            .pending
            .remove(token)
            .ok_or_else(|| NodeError::Join("unknown or expired challenge".into()))?;

        let frame = hex::decode(&answer.token)
            .map_err(|e| NodeError::Join(format!("answer is not hex: {e}")))?;
        let envelope = Envelope::parse(&frame)
            .map_err(|e| NodeError::Join(format!("answer does not decode: {e}")))?;
        let Payload::Auth(auth) = &envelope.payload else {
            return Err(NodeError::Join("answer is not an auth envelope".into()));
        };
        if auth.token != token
            || envelope.origin != pending.public_key
            || !auth.verify(&envelope.origin)
            || !envelope.verify_signature()
        {
            return Err(NodeError::Join(format!(
                "challenge failed for {}",
                pending.public_key.short()
            )));
        }
        Ok(pending)
    }

    /// Drop a pending join whose challenge could not be fetched.
    pub fn abandon(&mut self, token: &str) -> Option<PendingJoin> {
        self.pending.remove(token)
    }

    pub fn expire(&mut self, now: u64) {
        self.pending.retain(|_, p| p.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::{KeyWallet, Wallet};
    use shroud_ledger::{genesis_block, GenesisPeer};
    use shroud_messages::{Auth, EnvelopeFactory};
    use shroud_store::MemoryChain;

    const NOW: u64 = 1_700_000_000_000;

    fn chain(member: &KeyWallet) -> MemoryChain {
        MemoryChain::from_genesis(
            genesis_block(&[GenesisPeer {
                public_key: member.public_key(),
                address: "10.0.0.1:17468".into(),
                http: "10.0.0.1:17469".into(),
                stake: 1000,
            }])
            .unwrap(),
        )
        .unwrap()
    }

    fn answer(wallet: &KeyWallet, token: &str) -> ChallengeAnswer {
        let envelope = EnvelopeFactory::new()
            .create(wallet, Payload::Auth(Auth::create(wallet, token)), NOW)
            .unwrap();
        ChallengeAnswer {
            token: hex::encode(envelope.pack().unwrap()),
        }
    }

    #[test]
    fn address_shapes() {
        assert!(is_address("10.0.0.1:17468"));
        assert!(is_address("abcdef.b32.i2p:80"));
        assert!(!is_address("10.0.0.1"));
        assert!(!is_address("http://x:1"));
        assert!(!is_address("x:0"));
        assert!(!is_address(":80"));
    }

    #[test]
    fn valid_answer_completes_the_join() {
        let member = KeyWallet::from_seed(&[1; 32]);
        let joiner = KeyWallet::from_seed(&[2; 32]);
        let dir = chain(&member);
        let mut joins = JoinRegistry::new(10_000);

        let req = joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW)
            .unwrap();
        assert_eq!(req.url, format!("http://10.0.0.2:17469/challenge/{}", req.token));
        assert_eq!(req.token.len(), CHALLENGE_TOKEN_LEN);

        let done = joins.complete(&req.token, &answer(&joiner, &req.token), NOW + 1).unwrap();
        assert_eq!(done.public_key, joiner.public_key());
        assert_eq!(done.address, "10.0.0.2:17468");
        assert!(joins.is_empty());
    }

    #[test]
    fn answers_signed_by_someone_else_fail() {
        let member = KeyWallet::from_seed(&[1; 32]);
        let joiner = KeyWallet::from_seed(&[2; 32]);
        let impostor = KeyWallet::from_seed(&[3; 32]);
        let dir = chain(&member);
        let mut joins = JoinRegistry::new(10_000);

        let req = joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW)
            .unwrap();
        assert!(joins.complete(&req.token, &answer(&impostor, &req.token), NOW).is_err());
        // the pending entry is consumed by a failed answer
        assert!(joins.complete(&req.token, &answer(&joiner, &req.token), NOW).is_err());
    }

    #[test]
    fn wrong_token_in_answer_fails() {
        let member = KeyWallet::from_seed(&[1; 32]);
        let joiner = KeyWallet::from_seed(&[2; 32]);
        let dir = chain(&member);
        let mut joins = JoinRegistry::new(10_000);
        let req = joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW)
            .unwrap();
        let other = random_token(CHALLENGE_TOKEN_LEN);
        assert!(joins.complete(&req.token, &answer(&joiner, &other), NOW).is_err());
    }

    #[test]
    fn rejects_members_duplicates_and_expired() {
        let member = KeyWallet::from_seed(&[1; 32]);
        let joiner = KeyWallet::from_seed(&[2; 32]);
        let dir = chain(&member);
        let mut joins = JoinRegistry::new(10_000);

        assert!(joins
            .register(member.public_key(), "10.0.0.1:17468", "10.0.0.1:17469", &dir, NOW)
            .is_err());
        let req = joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW)
            .unwrap();
        assert!(joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW)
            .is_err());

        let late = joins.complete(&req.token, &answer(&joiner, &req.token), NOW + 10_000);
        assert!(late.is_err());
        assert!(joins
            .register(joiner.public_key(), "10.0.0.2:17468", "10.0.0.2:17469", &dir, NOW + 10_000)
            .is_ok());
    }
}
