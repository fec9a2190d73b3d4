//! The consensus driver.
//!
//! ```text
//! PROPOSED --(vote quorum)--> VOTED --(commit quorum)--> COMMITTED --(append)--> FINALIZED
//! ```
//!
//! The driver is fed validated envelopes and clock ticks. Each call returns a
//! [`Step`]: payloads the caller must publish and blocks that were appended
//! to the chain. Votes are locked once per height; commits once per height
//! and never released.
//!
//! A held commit lock is only re-announced. If lost messages let two blocks
//! at one height both reach vote quorum and the commits split below quorum
//! on each, that height does not finalize through commits. Members that
//! fall behind this way recover once a finalized block reaches them as a
//! `Sync` reply; switching a commit to the other block would let both
//! blocks reach commit quorum.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use shroud_crypto::Wallet;
use shroud_ledger::{Block, Transaction};
use shroud_messages::{Commit, Envelope, Payload, Vote};
use shroud_network::Schedule;
use shroud_store::{BlockStore, PeerDirectory, StoreError};
use shroud_types::{BlockHash, PublicKey};

use crate::block_pool::BlockPool;
use crate::commit_pool::CommitPool;
use crate::error::ConsensusError;
use crate::quorum::{QuorumPolicy, StakeTable};
use crate::transaction_pool::TransactionPool;
use crate::vote_pool::VotePool;

#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// How often the stack is checked for a new local proposal.
    pub propose_interval_ms: u64,
    /// Age after which an unfinished proposal is abandoned and a vote or
    /// commit lock is refreshed.
    pub proposal_timeout_ms: u64,
    pub cleanup_interval_ms: u64,
    pub quorum: QuorumPolicy,
    /// Out-of-order catch-up blocks held until their predecessor arrives.
    pub max_sync_buffer: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            propose_interval_ms: 10_000,
            proposal_timeout_ms: 28_000,
            cleanup_interval_ms: 28_000,
            quorum: QuorumPolicy::default(),
            max_sync_buffer: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum DriverTimer {
    Propose,
    Cleanup,
}

/// Output of one driver call.
#[derive(Debug, Default)]
pub struct Step {
    pub publish: Vec<Payload>,
    pub finalized: Vec<Block>,
}

impl Step {
    pub fn is_empty(&self) -> bool {
        self.publish.is_empty() && self.finalized.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct Lock {
    height: u64,
    hash: BlockHash,
    at: u64,
}

pub struct ConsensusDriver {
    identity: PublicKey,
    config: DriverConfig,
    transactions: TransactionPool,
    blocks: BlockPool,
    votes: VotePool,
    commits: CommitPool,
    proposal: Option<Lock>,
    vote_lock: Option<Lock>,
    commit_lock: Option<Lock>,
    sync_buffer: BTreeMap<u64, Block>,
    schedule: Schedule<DriverTimer>,
}

impl ConsensusDriver {
    pub fn new(identity: PublicKey, config: DriverConfig) -> Self {
        Self {
            identity,
            config,
            transactions: TransactionPool::new(),
            blocks: BlockPool::new(),
            votes: VotePool::new(),
            commits: CommitPool::new(),
            proposal: None,
            vote_lock: None,
            commit_lock: None,
            sync_buffer: BTreeMap::new(),
            schedule: Schedule::new(),
        }
    }

    pub fn start(&mut self, now: u64) {
        self.schedule
            .set(DriverTimer::Propose, now + self.config.propose_interval_ms);
        self.schedule
            .set(DriverTimer::Cleanup, now + self.config.cleanup_interval_ms);
    }

    pub fn stop(&mut self) {
        self.schedule.clear();
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.schedule.next_deadline()
    }

    pub fn policy(&self) -> &QuorumPolicy {
        &self.config.quorum
    }

    pub fn transaction_pool(&self) -> &TransactionPool {
        &self.transactions
    }

    pub fn block_pool(&self) -> &BlockPool {
        &self.blocks
    }

    pub fn vote_pool(&self) -> &VotePool {
        &self.votes
    }

    pub fn commit_pool(&self) -> &CommitPool {
        &self.commits
    }

    /// Stack a locally submitted transaction for the next proposal.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), ConsensusError> {
        tracing::debug!(ident = %tx.ident, commands = tx.commands.len(), "transaction stacked");
        self.transactions.stack(tx)
    }

    // ── Timers ──────────────────────────────────────────────────────────

    pub fn tick<C: BlockStore + PeerDirectory>(
        &mut self,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
    ) -> Result<Step, ConsensusError> {
        let mut step = Step::default();
        for timer in self.schedule.take_due(now) {
            match timer {
                DriverTimer::Propose => {
                    self.schedule
                        .set(DriverTimer::Propose, now + self.config.propose_interval_ms);
                    self.propose(now, chain, wallet, &mut step)?;
                }
                DriverTimer::Cleanup => {
                    self.schedule
                        .set(DriverTimer::Cleanup, now + self.config.cleanup_interval_ms);
                    self.cleanup(now, chain, wallet, &mut step)?;
                }
            }
        }
        Ok(step)
    }

    fn propose<C: BlockStore + PeerDirectory>(
        &mut self,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
        step: &mut Step,
    ) -> Result<(), ConsensusError> {
        let height = chain.height() + 1;
        if !self.can_vote(height) {
            return Ok(());
        }
        let txs = self.transactions.take_for_proposal();
        if txs.is_empty() {
            return Ok(());
        }
        let block = match Block::next(chain.latest(), txs) {
            Ok(block) => block,
            Err(e) => {
                self.transactions.release();
                return Err(e.into());
            }
        };
        tracing::info!(height, hash = %block.hash, txs = block.transactions.len(), "proposing block");
        self.proposal = Some(Lock {
            height,
            hash: block.hash,
            at: now,
        });
        self.blocks.propose(self.identity, block.clone());
        step.publish.push(Payload::Proposal(block.clone()));
        self.vote_for(block, now, chain, wallet, step)
    }

    fn cleanup<C: BlockStore + PeerDirectory>(
        &mut self,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
        step: &mut Step,
    ) -> Result<(), ConsensusError> {
        let height = chain.height();
        self.purge_up_to(height);
        let timeout = self.config.proposal_timeout_ms;

        if let Some(p) = self.proposal {
            if now >= p.at + timeout {
                tracing::info!(height = p.height, hash = %p.hash, "proposal abandoned");
                self.transactions.release();
                self.proposal = None;
            }
        }

        // a stuck commit is re-announced; the lock itself holds
        if let Some(lock) = self.commit_lock {
            if now >= lock.at + timeout {
                if let Some(sealed) = self.commits.block(&lock.hash).cloned() {
                    step.publish.push(Payload::Commit(Commit::create(wallet, sealed)?));
                    self.commit_lock = Some(Lock { at: now, ..lock });
                }
            }
            return Ok(());
        }

        if let Some(lock) = self.vote_lock {
            if now >= lock.at + timeout {
                self.vote_lock = None;
                if let Some(block) = self.strongest_candidate(height + 1, chain) {
                    tracing::debug!(height = block.height, hash = %block.hash, "vote lock expired, re-voting");
                    self.vote_for(block, now, chain, wallet, step)?;
                }
            }
        }
        Ok(())
    }

    /// The candidate at `height` with the most vote weight, lowest hash on ties.
    fn strongest_candidate<C: PeerDirectory>(&self, height: u64, chain: &C) -> Option<Block> {
        let stakes = StakeTable::from_directory(chain);
        let tip = chain.latest().hash;
        self.blocks
            .at_height(height)
            .into_iter()
            .filter(|b| b.previous_hash == tip)
            .map(|b| (b, self.votes.weight(&b.hash, &stakes)))
            .max_by(|(a, wa), (b, wb)| match wa.cmp(wb) {
                Ordering::Equal => b.hash.cmp(&a.hash),
                other => other,
            })
            .map(|(b, _)| b.clone())
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    pub fn on_envelope<C: BlockStore + PeerDirectory>(
        &mut self,
        envelope: &Envelope,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
    ) -> Result<Step, ConsensusError> {
        let mut step = Step::default();
        let next = chain.height() + 1;
        let tip = chain.latest().hash;
        let extends_tip = |b: &Block| b.height == next && b.previous_hash == tip;

        match &envelope.payload {
            Payload::Proposal(block) => {
                if !extends_tip(block) {
                    tracing::trace!(height = block.height, "proposal does not extend the tip");
                    return Ok(step);
                }
                if !self.blocks.propose(envelope.origin, block.clone()) {
                    return Ok(step);
                }
                if self.can_vote(next) {
                    self.vote_for(block.clone(), now, chain, wallet, &mut step)?;
                }
            }
            Payload::Vote(vote) => {
                if !extends_tip(&vote.block) {
                    return Ok(step);
                }
                self.blocks.candidate(vote.block.clone());
                if self.can_vote(next) {
                    self.vote_for(vote.block.clone(), now, chain, wallet, &mut step)?;
                }
                self.record_vote(vote, now, chain, wallet, &mut step)?;
            }
            Payload::Commit(commit) => {
                if !extends_tip(&commit.block) {
                    return Ok(step);
                }
                let finalized = self.record_commit(commit, chain, &mut step)?;
                if !finalized && self.can_commit(next) {
                    self.issue_commit(commit.block.clone(), now, chain, wallet, &mut step)?;
                }
            }
            Payload::Sync(block) => {
                if block.height < next {
                    return Ok(step);
                }
                if extends_tip(block) {
                    self.finalize(block.clone(), chain, &mut step)?;
                } else if self.sync_buffer.len() < self.config.max_sync_buffer {
                    self.sync_buffer.insert(block.height, block.clone());
                }
            }
            Payload::Auth(_) | Payload::Challenge(_) => {}
        }
        Ok(step)
    }

    fn can_vote(&self, height: u64) -> bool {
        self.vote_lock.map_or(true, |l| l.height != height)
    }

    fn can_commit(&self, height: u64) -> bool {
        self.commit_lock.map_or(true, |l| l.height != height)
    }

    fn vote_for<C: BlockStore + PeerDirectory>(
        &mut self,
        block: Block,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
        step: &mut Step,
    ) -> Result<(), ConsensusError> {
        let vote = Vote::create(wallet, block);
        self.vote_lock = Some(Lock {
            height: vote.block.height,
            hash: vote.block.hash,
            at: now,
        });
        step.publish.push(Payload::Vote(vote.clone()));
        self.record_vote(&vote, now, chain, wallet, step)
    }

    fn record_vote<C: BlockStore + PeerDirectory>(
        &mut self,
        vote: &Vote,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
        step: &mut Step,
    ) -> Result<(), ConsensusError> {
        let stakes = StakeTable::from_directory(chain);
        let status = self.votes.add(vote, &stakes, &self.config.quorum);
        if !status.is_reached() || !self.can_commit(vote.block.height) {
            return Ok(());
        }
        match self.votes.block_with_votes(&vote.block.hash) {
            Some(sealed) => self.issue_commit(sealed, now, chain, wallet, step),
            None => Ok(()),
        }
    }

    fn issue_commit<C: BlockStore + PeerDirectory>(
        &mut self,
        sealed: Block,
        now: u64,
        chain: &mut C,
        wallet: &dyn Wallet,
        step: &mut Step,
    ) -> Result<(), ConsensusError> {
        let commit = Commit::create(wallet, sealed)?;
        tracing::debug!(
            height = commit.block.height,
            hash = %commit.block.hash,
            votes = commit.block.votes.len(),
            "committing block"
        );
        self.commit_lock = Some(Lock {
            height: commit.block.height,
            hash: commit.block.hash,
            at: now,
        });
        step.publish.push(Payload::Commit(commit.clone()));
        self.record_commit(&commit, chain, step)?;
        Ok(())
    }

    /// Returns whether the commit finalized its block.
    fn record_commit<C: BlockStore + PeerDirectory>(
        &mut self,
        commit: &Commit,
        chain: &mut C,
        step: &mut Step,
    ) -> Result<bool, ConsensusError> {
        let stakes = StakeTable::from_directory(chain);
        if !self
            .commits
            .add(commit, &stakes, &self.config.quorum)
            .is_reached()
        {
            return Ok(false);
        }
        match self.commits.block(&commit.block.hash).cloned() {
            Some(block) => self.finalize(block, chain, step),
            None => Ok(false),
        }
    }

    // ── Finalization ────────────────────────────────────────────────────

    /// Append `block`, then any buffered catch-up blocks that now extend
    /// the tip.
    fn finalize<C: BlockStore + PeerDirectory>(
        &mut self,
        block: Block,
        chain: &mut C,
        step: &mut Step,
    ) -> Result<bool, ConsensusError> {
        if !self.append(block, chain, step)? {
            return Ok(false);
        }
        while let Some(next) = self.sync_buffer.remove(&(chain.height() + 1)) {
            if !self.append(next, chain, step)? {
                break;
            }
        }
        Ok(true)
    }

    fn append<C: BlockStore + PeerDirectory>(
        &mut self,
        block: Block,
        chain: &mut C,
        step: &mut Step,
    ) -> Result<bool, ConsensusError> {
        let height = block.height;
        match chain.append(block.clone()) {
            Ok(()) => {}
            Err(StoreError::Conflict { height, reason }) => {
                tracing::warn!(height, reason = %reason, "finalized block rejected by store");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let local = self.transactions.finalize(&block);
        self.proposal = None;
        self.purge_up_to(height);
        tracing::info!(
            height,
            hash = %block.hash,
            txs = block.transactions.len(),
            local,
            votes = block.votes.len(),
            "block finalized"
        );
        step.finalized.push(block);
        Ok(true)
    }

    fn purge_up_to(&mut self, height: u64) {
        self.blocks.purge_up_to(height);
        self.votes.purge_up_to(height);
        self.commits.purge_up_to(height);
        self.sync_buffer.retain(|h, _| *h > height);
        if self.vote_lock.is_some_and(|l| l.height <= height) {
            self.vote_lock = None;
        }
        if self.commit_lock.is_some_and(|l| l.height <= height) {
            self.commit_lock = None;
        }
        if self.proposal.is_some_and(|p| p.height <= height) {
            self.proposal = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::KeyWallet;
    use shroud_ledger::{genesis_block, Command, GenesisPeer};
    use shroud_messages::EnvelopeFactory;
    use shroud_store::MemoryChain;

    const NOW: u64 = 1_700_000_000_000;

    struct Member {
        wallet: KeyWallet,
        chain: MemoryChain,
        driver: ConsensusDriver,
        factory: EnvelopeFactory,
    }

    fn members(n: u8) -> Vec<Member> {
        let wallets: Vec<KeyWallet> = (1..=n).map(|i| KeyWallet::from_seed(&[i; 32])).collect();
        let peers: Vec<GenesisPeer> = wallets
            .iter()
            .enumerate()
            .map(|(i, w)| GenesisPeer {
                public_key: w.public_key(),
                address: format!("n{i}:1"),
                http: format!("n{i}:2"),
                stake: 1000,
            })
            .collect();
        let genesis = genesis_block(&peers).unwrap();
        wallets
            .into_iter()
            .map(|wallet| {
                let mut driver = ConsensusDriver::new(wallet.public_key(), DriverConfig::default());
                driver.start(NOW);
                Member {
                    chain: MemoryChain::from_genesis(genesis.clone()).unwrap(),
                    driver,
                    factory: EnvelopeFactory::new(),
                    wallet,
                }
            })
            .collect()
    }

    fn tx(w: &KeyWallet, ident: &str) -> Transaction {
        let cmd = Command::Data {
            seq: 1,
            ns: "test".into(),
            data: ident.into(),
        };
        Transaction::create(w, vec![cmd], Some(ident), NOW).unwrap()
    }

    fn envelope(m: &mut Member, payload: Payload) -> Envelope {
        m.factory.create(&m.wallet, payload, NOW).unwrap()
    }

    /// Flood every published payload to all other members until quiet.
    fn flood(members: &mut [Member], from: usize, first: Step, now: u64) {
        let mut queue: Vec<(usize, Payload)> =
            first.publish.into_iter().map(|p| (from, p)).collect();
        while let Some((author, payload)) = queue.pop() {
            let env = {
                let m = &mut members[author];
                m.factory.create(&m.wallet, payload, now).unwrap()
            };
            for (i, m) in members.iter_mut().enumerate() {
                if i == author {
                    continue;
                }
                let step = m.driver.on_envelope(&env, now, &mut m.chain, &m.wallet).unwrap();
                queue.extend(step.publish.into_iter().map(|p| (i, p)));
            }
        }
    }

    #[test]
    fn transaction_finalizes_on_every_member() {
        let mut ms = members(4);
        let t = tx(&ms[0].wallet, "hello");
        ms[0].driver.submit(t.clone()).unwrap();
        let at = NOW + 10_000;
        let step = {
            let m = &mut ms[0];
            m.driver.tick(at, &mut m.chain, &m.wallet).unwrap()
        };
        assert!(matches!(step.publish[0], Payload::Proposal(_)));
        assert!(matches!(step.publish[1], Payload::Vote(_)));
        flood(&mut ms, 0, step, at);

        for m in &ms {
            assert_eq!(m.chain.height(), 1);
            let tip = m.chain.latest();
            assert!(tip.contains(&t.origin, "hello"));
            assert!(tip.votes.len() >= 3);
            assert!(m.driver.vote_pool().is_empty());
            assert!(m.driver.commit_pool().is_empty());
        }
        assert!(ms[0].driver.transaction_pool().pooled().is_empty());
        assert!(ms[0].driver.transaction_pool().stacked().is_empty());
    }

    #[test]
    fn votes_once_per_height() {
        let mut ms = members(4);
        let (a, b) = {
            let tip = ms[0].chain.latest().clone();
            (
                Block::next(&tip, vec![tx(&ms[1].wallet, "a")]).unwrap(),
                Block::next(&tip, vec![tx(&ms[2].wallet, "b")]).unwrap(),
            )
        };
        let env_a = envelope(&mut ms[1], Payload::Proposal(a.clone()));
        let env_b = envelope(&mut ms[2], Payload::Proposal(b));

        let m = &mut ms[0];
        let first = m.driver.on_envelope(&env_a, NOW, &mut m.chain, &m.wallet).unwrap();
        let second = m.driver.on_envelope(&env_b, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(matches!(&first.publish[..], [Payload::Vote(v)] if v.block.hash == a.hash));
        assert!(second.publish.is_empty());
        assert_eq!(m.driver.block_pool().at_height(1).len(), 2);
    }

    #[test]
    fn seen_commit_triggers_own_commit() {
        let mut ms = members(4);
        let tip = ms[0].chain.latest().clone();
        let block = Block::next(&tip, vec![tx(&ms[1].wallet, "c")]).unwrap();
        let votes = ms[1..]
            .iter()
            .map(|m| Vote::create(&m.wallet, block.clone()).signature())
            .collect();
        let commit = Commit::create(&ms[1].wallet, block.with_votes(votes)).unwrap();
        let env = envelope(&mut ms[1], Payload::Commit(commit));

        let m = &mut ms[0];
        let step = m.driver.on_envelope(&env, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(matches!(&step.publish[..], [Payload::Commit(c)] if c.origin == m.wallet.public_key()));
        assert_eq!(m.chain.height(), 0);
        assert_eq!(m.driver.commit_pool().len(), 1);
    }

    #[test]
    fn commit_lock_holds_across_a_split() {
        let mut ms = members(4);
        let tip = ms[0].chain.latest().clone();
        let seal = |block: Block, ms: &[Member]| {
            let votes = ms[1..]
                .iter()
                .map(|m| Vote::create(&m.wallet, block.clone()).signature())
                .collect();
            block.with_votes(votes)
        };
        let a = seal(Block::next(&tip, vec![tx(&ms[1].wallet, "a")]).unwrap(), &ms[..]);
        let b = seal(Block::next(&tip, vec![tx(&ms[2].wallet, "b")]).unwrap(), &ms[..]);
        let payload_a = Payload::Commit(Commit::create(&ms[1].wallet, a.clone()).unwrap());
        let env_a = envelope(&mut ms[1], payload_a);
        let payload_b = Payload::Commit(Commit::create(&ms[2].wallet, b).unwrap());
        let env_b = envelope(&mut ms[2], payload_b);

        let m = &mut ms[0];
        let first = m.driver.on_envelope(&env_a, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(matches!(&first.publish[..], [Payload::Commit(c)] if c.block.hash == a.hash));
        let second = m.driver.on_envelope(&env_b, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(second.is_empty());

        // after the timeout the same commit is re-announced, never the other block
        let step = m.driver.tick(NOW + 30_000, &mut m.chain, &m.wallet).unwrap();
        assert!(matches!(&step.publish[..], [Payload::Commit(c)] if c.block.hash == a.hash));
        assert_eq!(m.chain.height(), 0);
        assert_eq!(m.driver.commit_pool().len(), 2);
    }

    #[test]
    fn sync_blocks_finalize_in_order() {
        let mut ms = members(4);
        let seal = |block: Block, ms: &[Member]| {
            let votes = ms
                .iter()
                .map(|m| Vote::create(&m.wallet, block.clone()).signature())
                .collect();
            block.with_votes(votes)
        };
        let b1 = seal(Block::next(ms[0].chain.latest(), vec![tx(&ms[1].wallet, "s1")]).unwrap(), &ms[..]);
        let b2 = seal(Block::next(&b1, vec![tx(&ms[1].wallet, "s2")]).unwrap(), &ms[..]);
        let e2 = envelope(&mut ms[1], Payload::Sync(b2));
        let e1 = envelope(&mut ms[1], Payload::Sync(b1));

        let m = &mut ms[0];
        let early = m.driver.on_envelope(&e2, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(early.finalized.is_empty());
        let step = m.driver.on_envelope(&e1, NOW, &mut m.chain, &m.wallet).unwrap();
        assert_eq!(step.finalized.len(), 2);
        assert_eq!(m.chain.height(), 2);
    }

    #[test]
    fn abandoned_proposal_returns_to_stack() {
        let mut ms = members(4);
        let m = &mut ms[0];
        m.driver.submit(tx(&m.wallet, "lonely")).unwrap();
        m.driver.tick(NOW + 10_000, &mut m.chain, &m.wallet).unwrap();
        assert_eq!(m.driver.transaction_pool().pooled().len(), 1);

        let step = m.driver.tick(NOW + 40_000, &mut m.chain, &m.wallet).unwrap();
        assert!(m.driver.transaction_pool().pooled().is_empty());
        assert_eq!(m.driver.transaction_pool().stacked().len(), 1);
        // the expired vote lock is renewed on the same candidate
        assert!(matches!(&step.publish[..], [Payload::Vote(v)] if v.block.height == 1));
    }

    #[test]
    fn stale_proposal_ignored() {
        let mut ms = members(4);
        let stale = Block::next(ms[0].chain.latest(), vec![tx(&ms[1].wallet, "x")]).unwrap();
        let future = Block::next(&stale, vec![tx(&ms[1].wallet, "y")]).unwrap();
        let env = envelope(&mut ms[1], Payload::Proposal(future));
        let m = &mut ms[0];
        let step = m.driver.on_envelope(&env, NOW, &mut m.chain, &m.wallet).unwrap();
        assert!(step.is_empty());
        assert!(m.driver.block_pool().is_empty());
    }
}
