//! The shroud node.
//!
//! [`ShroudNode`] owns the chain, the network engine, the validator and the
//! consensus driver and moves data between them. It is synchronous: the
//! runtime feeds it datagrams, ticks and API requests with an explicit clock
//! value and writes whatever the engine queued afterwards.

use std::sync::Arc;

use shroud_consensus::{AttestationSummary, ConsensusDriver, StakeTable, Step, Validator};
use shroud_crypto::{is_token, Wallet};
use shroud_ledger::{check_genesis, Block, Command, Transaction, MAX_IDENT_LEN};
use shroud_messages::{Auth, Payload, CHALLENGE_TOKEN_LEN};
use shroud_network::{GossipEntry, Inbound, NetworkEngine, Outbound, PeerStatus, Readiness};
use shroud_store::{BlockStore, MemoryChain, Peer, PeerDirectory};
use shroud_types::PublicKey;

use crate::config::NodeConfig;
use crate::join::{ChallengeAnswer, ChallengeRequest, JoinRegistry};
use crate::metrics::NodeMetrics;
use crate::NodeError;

/// Most blocks a single range query returns.
pub const MAX_BLOCK_QUERY: u64 = 1_000;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

pub struct ShroudNode {
    config: NodeConfig,
    wallet: Box<dyn Wallet>,
    chain: MemoryChain,
    engine: NetworkEngine,
    driver: ConsensusDriver,
    validator: Validator,
    joins: JoinRegistry,
    metrics: Arc<NodeMetrics>,
}

impl ShroudNode {
    /// Build a node on top of `genesis`. `seed` drives the engine's gossip
    /// shuffles and ping sampling.
    pub fn new(
        config: NodeConfig,
        wallet: Box<dyn Wallet>,
        genesis: Block,
        metrics: Arc<NodeMetrics>,
        seed: u64,
    ) -> Result<Self, NodeError> {
        let config = config.normalized();
        check_genesis(&genesis)?;
        let chain = MemoryChain::from_genesis(genesis)?;
        let identity = wallet.public_key();
        let driver_config = config.driver_config();
        let validator = Validator::new(StakeTable::from_directory(&chain), driver_config.quorum);

        tracing::info!(
            public_key = %identity,
            peers = chain.peers().len(),
            quorum_bps = driver_config.quorum.bps(),
            "node initialised"
        );

        Ok(Self {
            engine: NetworkEngine::new(identity, config.engine_config(), seed),
            driver: ConsensusDriver::new(identity, driver_config),
            joins: JoinRegistry::new(config.auth_timeout_ms()),
            validator,
            chain,
            wallet,
            metrics,
            config,
        })
    }

    pub fn start(&mut self, now: u64) {
        self.engine.start(now, &self.chain);
        self.driver.start(now);
        self.update_gauges();
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn public_key(&self) -> PublicKey {
        self.wallet.public_key()
    }

    /// Whether our own key is in the authorized peer set.
    pub fn is_member(&self) -> bool {
        self.chain.peer(&self.public_key()).is_some()
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn set_bound(&mut self, bound: bool) {
        self.engine.set_bound(bound);
    }

    pub fn check_readiness(&mut self) -> Result<Readiness, NodeError> {
        Ok(self.engine.check_readiness(&self.chain)?)
    }

    pub fn seed_network(&mut self, peers: Vec<Peer>) {
        self.engine.seed_network(peers, &self.chain);
        self.update_gauges();
    }

    /// Earliest timer deadline of the engine and the driver.
    pub fn next_deadline(&self) -> Option<u64> {
        match (self.engine.next_deadline(), self.driver.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn drain_outbound(&mut self) -> Vec<Outbound> {
        self.engine.drain_outbox()
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn handle_datagram(&mut self, from: &str, frame: &[u8], now: u64) -> Result<(), NodeError> {
        self.metrics.datagrams_received.inc();
        let inbound = self.engine.handle_datagram(
            from,
            frame,
            &self.chain,
            &self.validator,
            self.wallet.as_ref(),
            now,
        );
        match inbound {
            Inbound::Deliver { envelope, .. } => {
                self.metrics.messages_accepted.inc();
                let step = self
                    .driver
                    .on_envelope(&envelope, now, &mut self.chain, self.wallet.as_ref())?;
                self.apply(step, now);
            }
            Inbound::Ping { .. } => self.metrics.pings_accepted.inc(),
            Inbound::Dropped(_) => self.metrics.messages_dropped.inc(),
        }
        Ok(())
    }

    pub fn tick(&mut self, now: u64) -> Result<(), NodeError> {
        self.engine.tick(now, &self.chain);
        let step = self.driver.tick(now, &mut self.chain, self.wallet.as_ref())?;
        self.apply(step, now);
        self.joins.expire(now);
        self.update_gauges();
        Ok(())
    }

    fn apply(&mut self, step: Step, now: u64) {
        for payload in step.publish {
            let msg_type = payload.msg_type();
            if let Err(e) = self.engine.publish(self.wallet.as_ref(), payload, now) {
                tracing::warn!(msg_type = msg_type.as_str(), error = %e, "publish failed");
            }
        }
        if step.finalized.is_empty() {
            return;
        }
        for block in &step.finalized {
            self.metrics.blocks_finalized.inc();
            tracing::info!(
                height = block.height,
                hash = %block.hash,
                transactions = block.transactions.len(),
                votes = block.votes.len(),
                "block finalized"
            );
        }
        self.validator
            .set_stakes(StakeTable::from_directory(&self.chain));
        self.engine.refresh_network(&self.chain);
        self.update_gauges();
    }

    fn update_gauges(&self) {
        self.metrics.chain_height.set(self.chain.height() as i64);
        self.metrics
            .network_size
            .set(self.engine.network().len() as i64);
        if let Some(avg) = self.engine.average_latency() {
            self.metrics.average_latency_ms.set(avg as i64);
        }
    }

    /// Sign `commands` with the node wallet and stack the transaction.
    pub fn submit_transaction(
        &mut self,
        commands: Vec<Command>,
        ident: Option<&str>,
        now: u64,
    ) -> Result<Transaction, NodeError> {
        if let Some(ident) = ident {
            if !is_token(ident, 1, MAX_IDENT_LEN) {
                return Err(NodeError::InvalidRequest(format!("malformed ident {ident:?}")));
            }
        }
        let tx = Transaction::create(self.wallet.as_ref(), commands, ident, now)?;
        tx.check()?;
        self.driver.submit(tx.clone())?;
        self.metrics.transactions_stacked.inc();
        Ok(tx)
    }

    // ── Join ────────────────────────────────────────────────────────────

    pub fn register_join(
        &mut self,
        public_key: PublicKey,
        address: &str,
        http: &str,
        now: u64,
    ) -> Result<ChallengeRequest, NodeError> {
        let req = self
            .joins
            .register(public_key, address, http, &self.chain, now)?;
        tracing::info!(peer = %public_key.short(), address, http, "join registered");
        Ok(req)
    }

    /// Sign a challenge token as a packed, hex-encoded Auth envelope.
    pub fn answer_challenge(&mut self, token: &str, now: u64) -> Result<ChallengeAnswer, NodeError> {
        if !is_token(token, CHALLENGE_TOKEN_LEN, CHALLENGE_TOKEN_LEN) {
            return Err(NodeError::InvalidRequest("malformed challenge token".into()));
        }
        let auth = Auth::create(self.wallet.as_ref(), token);
        let envelope = self
            .engine
            .envelope(self.wallet.as_ref(), Payload::Auth(auth), now)?;
        Ok(ChallengeAnswer {
            token: hex::encode(envelope.pack()?),
        })
    }

    /// Check a joiner's answer and stack the `AddPeer` admitting it.
    pub fn complete_join(
        &mut self,
        token: &str,
        answer: &ChallengeAnswer,
        now: u64,
    ) -> Result<Transaction, NodeError> {
        let joined = self.joins.complete(token, answer, now)?;
        let tx = self.submit_transaction(
            vec![Command::AddPeer {
                seq: 1,
                public_key: joined.public_key,
                address: joined.address.clone(),
                http: joined.http.clone(),
            }],
            None,
            now,
        )?;
        tracing::info!(peer = %joined.public_key.short(), ident = %tx.ident, "join accepted");
        Ok(tx)
    }

    pub fn abandon_join(&mut self, token: &str) {
        if let Some(p) = self.joins.abandon(token) {
            tracing::debug!(peer = %p.public_key.short(), "join abandoned");
        }
    }

    pub fn shutdown(&mut self) {
        self.driver.stop();
        self.engine.shutdown();
    }

    // ── Views ───────────────────────────────────────────────────────────

    pub fn network(&self) -> Vec<Peer> {
        self.engine.network().to_vec()
    }

    pub fn peers(&self) -> Vec<PeerStatus> {
        self.engine.peers(&self.chain)
    }

    pub fn gossip(&self) -> Vec<GossipEntry> {
        self.engine.gossip()
    }

    pub fn stack(&self) -> Vec<Transaction> {
        self.driver.transaction_pool().stacked().to_vec()
    }

    pub fn pooled_transactions(&self) -> Vec<Transaction> {
        self.driver.transaction_pool().pooled().to_vec()
    }

    pub fn pooled_blocks(&self) -> Vec<Block> {
        self.driver
            .block_pool()
            .blocks()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn votes(&self) -> Vec<AttestationSummary> {
        self.driver.vote_pool().summaries(self.validator.stakes())
    }

    pub fn commits(&self) -> Vec<AttestationSummary> {
        self.driver.commit_pool().summaries(self.validator.stakes())
    }

    pub fn height(&self) -> u64 {
        self.chain.height()
    }

    pub fn genesis(&self) -> Block {
        self.chain.genesis().clone()
    }

    pub fn latest(&self) -> Block {
        self.chain.latest().clone()
    }

    /// Catch-up blocks starting at `height`. `None` unless
    /// `1 <= height <= tip`.
    pub fn sync_blocks(&self, height: u64) -> Option<Vec<Block>> {
        if height == 0 || height > self.chain.height() {
            return None;
        }
        Some(self.chain.block_range(height, self.config.network_sync_size))
    }

    /// Blocks with `gte <= height <= lte`, newest `limit` of them when the
    /// range is larger. A zero `lte` means the tip.
    pub fn blocks(&self, gte: u64, lte: u64, limit: u64) -> Result<Vec<Block>, NodeError> {
        let tip = self.chain.height();
        let lte = if lte == 0 { tip } else { lte.min(tip) };
        if gte > lte {
            return Ok(Vec::new());
        }
        let limit = if limit == 0 { MAX_BLOCK_QUERY } else { limit.min(MAX_BLOCK_QUERY) };
        let from = gte.max((lte + 1).saturating_sub(limit));
        Ok(self.chain.get_range(from, lte)?)
    }

    /// One page of blocks, newest first. Page 1 ends at the tip.
    pub fn block_page(&self, page: u64, size: u64) -> Vec<Block> {
        let size = if size == 0 { DEFAULT_PAGE_SIZE } else { size.min(MAX_PAGE_SIZE) };
        let page = page.max(1);
        let tip = self.chain.height();
        let skip = (page - 1).saturating_mul(size);
        if skip > tip {
            return Vec::new();
        }
        let to = tip - skip;
        let from = (to + 1).saturating_sub(size);
        let mut blocks = self.chain.block_range(from, to - from + 1);
        blocks.reverse();
        blocks
    }

    pub fn find_transaction(&self, origin: &PublicKey, ident: &str) -> Option<Transaction> {
        self.chain.find_transaction(origin, ident)
    }
}
