//! The network engine.
//!
//! Owns the network snapshot, the gossip order, the replay guard, ping
//! bookkeeping and the outbox. All inputs arrive through
//! [`NetworkEngine::handle_datagram`] and [`NetworkEngine::tick`]; all
//! outputs leave through [`NetworkEngine::drain_outbox`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use shroud_crypto::Wallet;
use shroud_messages::{classify, Datagram, DecodeError, Envelope, EnvelopeFactory, Payload, Ping};
use shroud_store::{Peer, PeerDirectory};
use shroud_types::PublicKey;

use crate::gossip::{GossipOrder, RELAY_FANOUT};
use crate::ping::{ping_window, LatencyWindow, PingRejection, PingTracker};
use crate::replay::{GossipEntry, SequenceGuard};
use crate::schedule::Schedule;
use crate::sync::catch_up_blocks;
use crate::NetworkError;

/// Decides whether an envelope may enter the node.
pub trait Admission {
    fn admit(&self, envelope: &Envelope) -> bool;
}

impl<F: Fn(&Envelope) -> bool> Admission for F {
    fn admit(&self, envelope: &Envelope) -> bool {
        self(envelope)
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub ping_interval_ms: u64,
    pub morph_interval_ms: u64,
    pub sync_threshold: u64,
    pub sync_size: u64,
    pub readiness_max_attempts: u32,
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 2_000,
            morph_interval_ms: 120_000,
            sync_threshold: 1,
            sync_size: 10,
            readiness_max_attempts: 60,
            verbose: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum EngineTimer {
    PingRound,
    PingSend,
    Morph,
}

/// A frame for the transport to write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub to: String,
    pub frame: Vec<u8>,
}

#[derive(Debug)]
pub enum Inbound {
    /// An admitted, fresh envelope for the consensus driver.
    Deliver { envelope: Envelope, sender: PublicKey },
    /// An accepted ping; `synced` catch-up blocks were queued in reply.
    Ping {
        origin: PublicKey,
        height: u64,
        synced: usize,
    },
    Dropped(DropReason),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DropReason {
    Closing,
    UnknownSender,
    Decode(DecodeError),
    Invalid,
    Replay,
    Ping(PingRejection),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Waiting { attempt: u32 },
}

/// Directory view enriched with liveness data.
#[derive(Clone, Debug, Serialize)]
pub struct PeerStatus {
    pub public_key: PublicKey,
    pub address: String,
    pub http: String,
    pub stake: u64,
    pub last_ping: Option<u64>,
    pub in_network: bool,
}

pub struct NetworkEngine {
    identity: PublicKey,
    config: EngineConfig,
    rng: StdRng,
    network: Vec<Peer>,
    seeded: Vec<Peer>,
    order: GossipOrder,
    replay: SequenceGuard,
    pings: PingTracker,
    latency: LatencyWindow,
    factory: EnvelopeFactory,
    schedule: Schedule<EngineTimer>,
    ping_targets: Vec<PublicKey>,
    bound: bool,
    closing: bool,
    readiness_attempts: u32,
    outbox: Vec<Outbound>,
}

impl NetworkEngine {
    pub fn new(identity: PublicKey, config: EngineConfig, seed: u64) -> Self {
        Self {
            identity,
            config,
            rng: StdRng::seed_from_u64(seed),
            network: Vec::new(),
            seeded: Vec::new(),
            order: GossipOrder::new(),
            replay: SequenceGuard::new(),
            pings: PingTracker::new(),
            latency: LatencyWindow::new(),
            factory: EnvelopeFactory::new(),
            schedule: Schedule::new(),
            ping_targets: Vec::new(),
            bound: false,
            closing: false,
            readiness_attempts: 0,
            outbox: Vec::new(),
        }
    }

    /// Arm the ping and morph timers.
    pub fn start(&mut self, now: u64, directory: &dyn PeerDirectory) {
        self.refresh_network(directory);
        self.schedule.set(EngineTimer::PingRound, now);
        self.schedule
            .set(EngineTimer::Morph, now + self.config.morph_interval_ms);
    }

    pub fn identity(&self) -> &PublicKey {
        &self.identity
    }

    pub fn set_bound(&mut self, bound: bool) {
        self.bound = bound;
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    // ── Snapshot ────────────────────────────────────────────────────────

    /// Rebuild the snapshot from the directory plus any bootstrap-seeded
    /// peers. The gossip order is reshuffled only when membership changed.
    pub fn refresh_network(&mut self, directory: &dyn PeerDirectory) {
        let mut network: Vec<Peer> = directory
            .peers()
            .into_iter()
            .filter(|p| !p.address.is_empty())
            .collect();
        for s in &self.seeded {
            if !network.iter().any(|p| p.public_key == s.public_key) {
                network.push(s.clone());
            }
        }
        self.network = network;

        let members: Vec<PublicKey> = self.network.iter().map(|p| p.public_key).collect();
        if !self.order.covers(&members, &self.identity) {
            self.order.reshuffle(&members, &self.identity, &mut self.rng);
            tracing::debug!(fanout = self.order.len(), "gossip order rebuilt");
        }
    }

    /// Merge a snapshot obtained from a bootstrap endpoint.
    pub fn seed_network(&mut self, peers: Vec<Peer>, directory: &dyn PeerDirectory) {
        self.seeded = peers;
        self.refresh_network(directory);
    }

    pub fn network(&self) -> &[Peer] {
        &self.network
    }

    pub fn gossip_order(&self) -> &[PublicKey] {
        self.order.as_slice()
    }

    pub fn peers(&self, directory: &dyn PeerDirectory) -> Vec<PeerStatus> {
        directory
            .peers()
            .into_iter()
            .map(|p| PeerStatus {
                last_ping: self.pings.last_seen(&p.public_key),
                in_network: self.network.iter().any(|n| n.public_key == p.public_key),
                public_key: p.public_key,
                address: p.address,
                http: p.http,
                stake: p.stake,
            })
            .collect()
    }

    pub fn gossip(&self) -> Vec<GossipEntry> {
        self.replay.entries()
    }

    pub fn average_latency(&self) -> Option<u64> {
        self.latency.average()
    }

    fn address_of(&self, pk: &PublicKey) -> Option<&str> {
        self.network
            .iter()
            .find(|p| &p.public_key == pk)
            .map(|p| p.address.as_str())
    }

    fn sender_of(&self, address: &str, directory: &dyn PeerDirectory) -> Option<PublicKey> {
        self.network
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.public_key)
            .or_else(|| directory.public_key_by_address(address))
    }

    // ── Readiness ───────────────────────────────────────────────────────

    /// Ready once the transport is bound and the snapshot covers more than
    /// half of the directory.
    pub fn is_ready(&self, directory: &dyn PeerDirectory) -> bool {
        self.bound && self.network.len() * 2 > directory.peers().len()
    }

    /// One readiness poll. Fails once the retry budget is spent.
    pub fn check_readiness(
        &mut self,
        directory: &dyn PeerDirectory,
    ) -> Result<Readiness, NetworkError> {
        self.refresh_network(directory);
        if self.is_ready(directory) {
            self.readiness_attempts = 0;
            return Ok(Readiness::Ready);
        }
        self.readiness_attempts += 1;
        if self.readiness_attempts >= self.config.readiness_max_attempts {
            return Err(NetworkError::NotReady {
                attempts: self.readiness_attempts,
            });
        }
        Ok(Readiness::Waiting {
            attempt: self.readiness_attempts,
        })
    }

    // ── Timers ──────────────────────────────────────────────────────────

    pub fn next_deadline(&self) -> Option<u64> {
        self.schedule.next_deadline()
    }

    pub fn tick(&mut self, now: u64, directory: &dyn PeerDirectory) {
        if self.closing {
            return;
        }
        for timer in self.schedule.take_due(now) {
            match timer {
                EngineTimer::PingRound => self.ping_round(now, directory),
                EngineTimer::PingSend => self.send_pings(now, directory.height()),
                EngineTimer::Morph => {
                    let members: Vec<PublicKey> =
                        self.network.iter().map(|p| p.public_key).collect();
                    self.order.reshuffle(&members, &self.identity, &mut self.rng);
                    self.schedule
                        .set(EngineTimer::Morph, now + self.config.morph_interval_ms);
                    tracing::debug!(fanout = self.order.len(), "gossip order morphed");
                }
            }
        }
    }

    fn ping_round(&mut self, now: u64, directory: &dyn PeerDirectory) {
        self.refresh_network(directory);
        let interval = ping_window(self.config.ping_interval_ms, self.network.len());
        self.schedule.set(EngineTimer::PingRound, now + interval);
        if self.network.len() < 2 || !self.bound {
            return;
        }
        let count = self.order.len().div_ceil(3);
        self.ping_targets = self.order.sample(count, &mut self.rng);
        let delay = self.rng.gen_range(0..interval.max(1));
        self.schedule.set(EngineTimer::PingSend, now + delay);
    }

    fn send_pings(&mut self, now: u64, height: u64) {
        let frame = Ping::new(now, height).to_bytes();
        for pk in std::mem::take(&mut self.ping_targets) {
            if let Some(addr) = self.address_of(&pk) {
                self.outbox.push(Outbound {
                    to: addr.to_string(),
                    frame: frame.clone(),
                });
            }
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    pub fn handle_datagram(
        &mut self,
        from: &str,
        frame: &[u8],
        directory: &dyn PeerDirectory,
        gate: &dyn Admission,
        wallet: &dyn Wallet,
        now: u64,
    ) -> Inbound {
        if self.closing {
            return Inbound::Dropped(DropReason::Closing);
        }
        let Some(sender) = self.sender_of(from, directory) else {
            if self.config.verbose {
                tracing::trace!(from, "datagram from unknown address");
            }
            return Inbound::Dropped(DropReason::UnknownSender);
        };
        match classify(frame) {
            Ok(Datagram::Ping(ping)) => self.incoming_ping(sender, ping, directory, wallet, now),
            Ok(Datagram::Message(envelope)) => self.incoming_message(sender, envelope, frame, gate),
            Err(e) => {
                if self.config.verbose {
                    tracing::trace!(peer = %sender.short(), error = %e, "undecodable datagram");
                }
                Inbound::Dropped(DropReason::Decode(e))
            }
        }
    }

    fn incoming_ping(
        &mut self,
        sender: PublicKey,
        ping: Ping,
        directory: &dyn PeerDirectory,
        wallet: &dyn Wallet,
        now: u64,
    ) -> Inbound {
        let window = ping_window(self.config.ping_interval_ms, self.order.len());
        if let Err(reason) = self.pings.accept(&sender, ping.timestamp, now, window) {
            if self.config.verbose {
                tracing::trace!(peer = %sender.short(), ?reason, "ping rejected");
            }
            return Inbound::Dropped(DropReason::Ping(reason));
        }

        if let Some(avg) = self
            .latency
            .push(now.saturating_sub(ping.timestamp), self.order.len())
        {
            tracing::trace!(average_ms = avg, "latency window summarized");
        }

        let blocks = catch_up_blocks(
            directory,
            ping.height,
            self.config.sync_threshold,
            self.config.sync_size,
        );
        let mut synced = 0;
        for block in blocks {
            let height = block.height;
            match self.unicast(wallet, Payload::Sync(block), &sender, now) {
                Ok(()) => synced += 1,
                Err(e) => {
                    tracing::warn!(peer = %sender.short(), height, error = %e, "sync reply failed");
                    break;
                }
            }
        }
        if synced > 0 {
            tracing::debug!(peer = %sender.short(), from = ping.height + 1, synced, "pushed catch-up blocks");
        }
        Inbound::Ping {
            origin: sender,
            height: ping.height,
            synced,
        }
    }

    fn incoming_message(
        &mut self,
        sender: PublicKey,
        envelope: Envelope,
        frame: &[u8],
        gate: &dyn Admission,
    ) -> Inbound {
        let msg_type = envelope.msg_type();
        if !self.replay.is_fresh(msg_type, &envelope.origin, envelope.seq) {
            return Inbound::Dropped(DropReason::Replay);
        }
        if !gate.admit(&envelope) {
            if self.config.verbose {
                tracing::trace!(peer = %sender.short(), ident = %envelope.ident, "envelope failed validation");
            }
            return Inbound::Dropped(DropReason::Invalid);
        }
        self.replay.accept(msg_type, &envelope.origin, envelope.seq);

        if envelope.broadcast {
            self.relay(&envelope.origin, &sender, frame);
        }
        Inbound::Deliver { envelope, sender }
    }

    fn relay(&mut self, origin: &PublicKey, sender: &PublicKey, frame: &[u8]) {
        let targets = self
            .order
            .relay_targets(origin, sender, RELAY_FANOUT, &mut self.rng);
        for pk in targets {
            if let Some(addr) = self.address_of(&pk) {
                self.outbox.push(Outbound {
                    to: addr.to_string(),
                    frame: frame.to_vec(),
                });
            }
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Create a locally authored envelope without sending it.
    pub fn envelope(
        &mut self,
        wallet: &dyn Wallet,
        payload: Payload,
        now: u64,
    ) -> Result<Envelope, NetworkError> {
        let envelope = self.factory.create(wallet, payload, now)?;
        self.replay
            .accept(envelope.msg_type(), &envelope.origin, envelope.seq);
        Ok(envelope)
    }

    /// Author an envelope and send it to the full gossip order.
    pub fn publish(
        &mut self,
        wallet: &dyn Wallet,
        payload: Payload,
        now: u64,
    ) -> Result<Envelope, NetworkError> {
        let envelope = self.envelope(wallet, payload, now)?;
        let frame = envelope.pack()?;
        for pk in self.order.authored_targets() {
            if let Some(addr) = self.address_of(&pk) {
                self.outbox.push(Outbound {
                    to: addr.to_string(),
                    frame: frame.clone(),
                });
            }
        }
        Ok(envelope)
    }

    /// Author an envelope for a single peer.
    pub fn unicast(
        &mut self,
        wallet: &dyn Wallet,
        payload: Payload,
        to: &PublicKey,
        now: u64,
    ) -> Result<(), NetworkError> {
        let addr = self
            .address_of(to)
            .ok_or_else(|| NetworkError::PeerNotFound(to.to_string()))?
            .to_string();
        let frame = self.envelope(wallet, payload, now)?.pack()?;
        self.outbox.push(Outbound { to: addr, frame });
        Ok(())
    }

    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Stop all timers and discard queued frames.
    pub fn shutdown(&mut self) {
        self.closing = true;
        self.bound = false;
        self.schedule.clear();
        self.ping_targets.clear();
        self.outbox.clear();
        tracing::info!("network engine stopped");
    }
}
