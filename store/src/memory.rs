//! In-memory chain: the block list plus the peer map it implies.

use std::collections::{BTreeMap, HashMap};

use shroud_ledger::{check_genesis, Block, Command, Transaction};
use shroud_types::PublicKey;

use crate::block::BlockStore;
use crate::error::StoreError;
use crate::peer::{Peer, PeerDirectory};

pub struct MemoryChain {
    blocks: Vec<Block>,
    peers: BTreeMap<PublicKey, Peer>,
    by_address: HashMap<String, PublicKey>,
}

impl MemoryChain {
    pub fn from_genesis(genesis: Block) -> Result<Self, StoreError> {
        check_genesis(&genesis).map_err(|e| StoreError::Genesis(e.to_string()))?;
        let mut chain = Self {
            blocks: Vec::new(),
            peers: BTreeMap::new(),
            by_address: HashMap::new(),
        };
        chain.apply(&genesis);
        chain.blocks.push(genesis);
        Ok(chain)
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn total_stake(&self) -> u64 {
        self.peers.values().map(|p| p.stake).sum()
    }

    fn apply(&mut self, block: &Block) {
        for cmd in block.transactions.iter().flat_map(|t| &t.commands) {
            match cmd {
                Command::AddPeer {
                    public_key,
                    address,
                    http,
                    ..
                } => {
                    if self.peers.contains_key(public_key) {
                        continue;
                    }
                    self.by_address.insert(address.clone(), *public_key);
                    self.peers.insert(
                        *public_key,
                        Peer {
                            public_key: *public_key,
                            address: address.clone(),
                            http: http.clone(),
                            stake: 0,
                        },
                    );
                    tracing::debug!(peer = %public_key.short(), height = block.height, "peer added");
                }
                Command::RemovePeer { public_key, .. } => {
                    if let Some(peer) = self.peers.remove(public_key) {
                        self.by_address.remove(&peer.address);
                        tracing::debug!(peer = %public_key.short(), height = block.height, "peer removed");
                    }
                }
                Command::ModifyStake {
                    public_key, stake, ..
                } => {
                    if let Some(peer) = self.peers.get_mut(public_key) {
                        peer.stake = peer.stake.saturating_add_signed(*stake);
                    }
                }
                Command::Data { .. } | Command::TestLoad { .. } => {}
            }
        }
    }

    fn tip(&self) -> &Block {
        // from_genesis guarantees at least one block
        &self.blocks[self.blocks.len() - 1]
    }
}

impl PeerDirectory for MemoryChain {
    fn peers(&self) -> Vec<Peer> {
        self.peers.values().cloned().collect()
    }

    fn peer(&self, public_key: &PublicKey) -> Option<Peer> {
        self.peers.get(public_key).cloned()
    }

    fn public_key_by_address(&self, address: &str) -> Option<PublicKey> {
        self.by_address.get(address).copied()
    }

    fn height(&self) -> u64 {
        self.tip().height
    }

    fn latest(&self) -> &Block {
        self.tip()
    }

    fn block_range(&self, from: u64, count: u64) -> Vec<Block> {
        self.blocks
            .iter()
            .skip(from as usize)
            .take(count as usize)
            .cloned()
            .collect()
    }
}

impl BlockStore for MemoryChain {
    fn append(&mut self, block: Block) -> Result<(), StoreError> {
        let tip = self.tip();
        if block.height != tip.height + 1 {
            return Err(StoreError::Conflict {
                height: block.height,
                reason: format!("chain tip is {}", tip.height),
            });
        }
        if block.previous_hash != tip.hash {
            return Err(StoreError::Conflict {
                height: block.height,
                reason: "previous hash does not match tip".into(),
            });
        }
        self.apply(&block);
        self.blocks.push(block);
        Ok(())
    }

    fn get_range(&self, from: u64, to: u64) -> Result<Vec<Block>, StoreError> {
        if from > self.height() {
            return Err(StoreError::NotFound(from));
        }
        let to = to.min(self.height());
        Ok(self.block_range(from, to.saturating_sub(from) + 1))
    }

    fn find_transaction(&self, origin: &PublicKey, ident: &str) -> Option<Transaction> {
        self.blocks
            .iter()
            .rev()
            .flat_map(|b| &b.transactions)
            .find(|t| &t.origin == origin && t.ident == ident)
            .cloned()
    }
}
