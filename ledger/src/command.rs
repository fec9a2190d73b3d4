//! Commands carried by transactions.

use serde::{Deserialize, Serialize};
use shroud_types::PublicKey;

use crate::error::LedgerError;

pub const MAX_DATA_LEN: usize = 8192;
const MAX_ADDRESS_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Admit a peer to the directory.
    AddPeer {
        seq: u32,
        public_key: PublicKey,
        /// Datagram transport address.
        address: String,
        /// API address used by the peer fetch fallback.
        http: String,
    },
    RemovePeer {
        seq: u32,
        public_key: PublicKey,
    },
    /// Signed stake delta; stakes never go below zero.
    ModifyStake {
        seq: u32,
        public_key: PublicKey,
        stake: i64,
    },
    /// Opaque application data under a namespace.
    Data {
        seq: u32,
        ns: String,
        data: String,
    },
    TestLoad {
        seq: u32,
        timestamp: u64,
    },
}

impl Command {
    pub fn seq(&self) -> u32 {
        match self {
            Self::AddPeer { seq, .. }
            | Self::RemovePeer { seq, .. }
            | Self::ModifyStake { seq, .. }
            | Self::Data { seq, .. }
            | Self::TestLoad { seq, .. } => *seq,
        }
    }

    /// Structural checks. Commands in a transaction are numbered `1..=n`.
    pub fn check(&self, expected_seq: u32) -> Result<(), LedgerError> {
        let seq = self.seq();
        let fail = |reason: &str| LedgerError::InvalidCommand {
            seq,
            reason: reason.to_string(),
        };
        if seq != expected_seq {
            return Err(fail("out of sequence"));
        }
        match self {
            Self::AddPeer { address, http, .. } => {
                if address.is_empty() || address.len() > MAX_ADDRESS_LEN {
                    return Err(fail("bad transport address"));
                }
                if http.is_empty() || http.len() > MAX_ADDRESS_LEN {
                    return Err(fail("bad http address"));
                }
            }
            Self::Data { ns, data, .. } => {
                let ns_ok = (3..=64).contains(&ns.len())
                    && ns
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b"_:;-".contains(&b));
                if !ns_ok {
                    return Err(fail("bad namespace"));
                }
                if data.len() > MAX_DATA_LEN {
                    return Err(fail("data too large"));
                }
            }
            Self::RemovePeer { .. } | Self::ModifyStake { .. } | Self::TestLoad { .. } => {}
        }
        Ok(())
    }
}
