//! Typed envelope payloads.

use serde::{Deserialize, Serialize};
use shroud_crypto::{blake2b_256, is_token, verify_signature, Wallet};
use shroud_ledger::{Block, VoteSignature};
use shroud_types::{PublicKey, Signature};

use crate::error::EncodeError;

pub const CHALLENGE_TOKEN_LEN: usize = 26;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Auth,
    Challenge,
    Proposal,
    Vote,
    Commit,
    Sync,
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::Auth => 1,
            Self::Challenge => 2,
            Self::Proposal => 3,
            Self::Vote => 4,
            Self::Commit => 5,
            Self::Sync => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Challenge => "challenge",
            Self::Proposal => "proposal",
            Self::Vote => "vote",
            Self::Commit => "commit",
            Self::Sync => "sync",
        }
    }

    /// Whether relays re-gossip messages of this type. Sync replies and the
    /// join handshake are point-to-point.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::Proposal | Self::Vote | Self::Commit)
    }
}

/// Proof that `origin` holds its key: a signature over a challenge token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub token: String,
    pub sig: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub token: String,
}

/// A peer attests it validated `block`. `sig` covers the block hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub origin: PublicKey,
    pub block: Block,
    pub sig: Signature,
}

/// A peer attests it saw a vote quorum for `block`, whose `votes` carry that
/// quorum. `sig` covers the block hash followed by the serialized vote set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub origin: PublicKey,
    pub block: Block,
    pub sig: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Auth(Auth),
    Challenge(Challenge),
    Proposal(Block),
    Vote(Vote),
    Commit(Commit),
    Sync(Block),
}

impl Auth {
    pub fn create(wallet: &dyn Wallet, token: &str) -> Self {
        Self {
            token: token.to_string(),
            sig: wallet.sign(token.as_bytes()),
        }
    }

    pub fn verify(&self, origin: &PublicKey) -> bool {
        is_token(&self.token, CHALLENGE_TOKEN_LEN, CHALLENGE_TOKEN_LEN)
            && verify_signature(self.token.as_bytes(), &self.sig, origin)
    }
}

impl Vote {
    pub fn create(wallet: &dyn Wallet, block: Block) -> Self {
        Self {
            origin: wallet.public_key(),
            sig: wallet.sign(block.hash.as_bytes()),
            block,
        }
    }

    /// The signature covers the declared hash and the block is structurally
    /// valid, so any change to the block content invalidates the vote.
    pub fn is_valid(&self) -> bool {
        verify_signature(self.block.hash.as_bytes(), &self.sig, &self.origin)
            && self.block.check().is_ok()
    }

    pub fn signature(&self) -> VoteSignature {
        VoteSignature {
            origin: self.origin,
            sig: self.sig,
        }
    }
}

impl Commit {
    /// Sign `block`, which must already carry its vote set.
    pub fn create(wallet: &dyn Wallet, block: Block) -> Result<Self, EncodeError> {
        let msg = Self::signing_bytes(&block)?;
        Ok(Self {
            origin: wallet.public_key(),
            sig: wallet.sign(&msg),
            block,
        })
    }

    pub fn signing_bytes(block: &Block) -> Result<Vec<u8>, EncodeError> {
        let mut msg = block.hash.as_bytes().to_vec();
        msg.extend_from_slice(&block.votes_bytes()?);
        Ok(msg)
    }

    pub fn verify(&self) -> bool {
        match Self::signing_bytes(&self.block) {
            Ok(msg) => verify_signature(&msg, &self.sig, &self.origin),
            Err(_) => false,
        }
    }
}

/// Whether every attached vote signs the block hash.
pub fn votes_verify(block: &Block) -> bool {
    block
        .votes
        .iter()
        .all(|v| verify_signature(block.hash.as_bytes(), &v.sig, &v.origin))
}

impl Payload {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::Auth(_) => MessageType::Auth,
            Self::Challenge(_) => MessageType::Challenge,
            Self::Proposal(_) => MessageType::Proposal,
            Self::Vote(_) => MessageType::Vote,
            Self::Commit(_) => MessageType::Commit,
            Self::Sync(_) => MessageType::Sync,
        }
    }

    /// Content-derived identifier: the type code followed by the digest of
    /// the payload's unique content.
    pub fn ident(&self) -> String {
        let code = self.msg_type().code();
        let content = match self {
            Self::Auth(a) => digest(a.sig.as_bytes()),
            Self::Challenge(c) => c.token.clone(),
            Self::Proposal(b) | Self::Sync(b) => b.hash.to_string(),
            Self::Vote(v) => digest(v.sig.as_bytes()),
            Self::Commit(c) => digest(c.sig.as_bytes()),
        };
        format!("{code}{content}")
    }

    /// Height of the block this payload concerns, if any.
    pub fn height(&self) -> Option<u64> {
        match self {
            Self::Proposal(b) | Self::Sync(b) => Some(b.height),
            Self::Vote(v) => Some(v.block.height),
            Self::Commit(c) => Some(c.block.height),
            Self::Auth(_) | Self::Challenge(_) => None,
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(&blake2b_256(bytes)[..16])
}
