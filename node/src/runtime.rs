//! The async node runtime.
//!
//! A single task owns the [`ShroudNode`] and multiplexes the transport,
//! node timers, API requests and background fetch results with
//! `tokio::select!`. After every event the engine's outbox is written to the
//! transport. Everything else talks to the node through a [`NodeHandle`].

use std::sync::Arc;
use std::time::Duration;

use shroud_consensus::AttestationSummary;
use shroud_ledger::{Block, Command, Transaction};
use shroud_network::{
    poll_bootstrap, ApiFetcher, DatagramTransport, GossipEntry, NetworkError, PeerStatus,
    Readiness, BOOTSTRAP_POLL_INTERVAL,
};
use shroud_store::Peer;
use shroud_types::{Clock, PublicKey};
use tokio::sync::{mpsc, oneshot};

use crate::join::{ChallengeAnswer, JoinAccepted};
use crate::node::ShroudNode;
use crate::shutdown::ShutdownController;
use crate::NodeError;

const REQUEST_QUEUE: usize = 256;
/// Longest the loop sleeps without re-checking node timers.
const MAX_IDLE: Duration = Duration::from_secs(1);
const READINESS_POLL: Duration = Duration::from_secs(2);
const TRANSPORT_BACKOFF: Duration = Duration::from_millis(100);
/// Consecutive receive failures after which the transport is given up.
const TRANSPORT_ERROR_BUDGET: u32 = 20;

/// A query or command for the runtime task. Each carries its reply channel.
#[derive(Debug)]
pub enum NodeRequest {
    Network(oneshot::Sender<Vec<Peer>>),
    Peers(oneshot::Sender<Vec<PeerStatus>>),
    Gossip(oneshot::Sender<Vec<GossipEntry>>),
    Stack(oneshot::Sender<Vec<Transaction>>),
    PoolTransactions(oneshot::Sender<Vec<Transaction>>),
    PoolBlocks(oneshot::Sender<Vec<Block>>),
    PoolVotes(oneshot::Sender<Vec<AttestationSummary>>),
    PoolCommits(oneshot::Sender<Vec<AttestationSummary>>),
    Genesis(oneshot::Sender<Block>),
    Latest(oneshot::Sender<Block>),
    Sync {
        height: u64,
        reply: oneshot::Sender<Option<Vec<Block>>>,
    },
    Blocks {
        gte: u64,
        lte: u64,
        limit: u64,
        reply: oneshot::Sender<Result<Vec<Block>, NodeError>>,
    },
    BlockPage {
        page: u64,
        size: u64,
        reply: oneshot::Sender<Vec<Block>>,
    },
    Transaction {
        origin: PublicKey,
        ident: String,
        reply: oneshot::Sender<Option<Transaction>>,
    },
    Submit {
        commands: Vec<Command>,
        ident: Option<String>,
        reply: oneshot::Sender<Result<Transaction, NodeError>>,
    },
    Join {
        public_key: PublicKey,
        address: String,
        http: String,
        reply: oneshot::Sender<Result<JoinAccepted, NodeError>>,
    },
    Challenge {
        token: String,
        reply: oneshot::Sender<Result<ChallengeAnswer, NodeError>>,
    },
}

/// Results of tasks spawned by the runtime.
enum Background {
    Bootstrap(Option<Vec<Peer>>),
    ChallengeAnswered {
        token: String,
        answer: Result<ChallengeAnswer, NetworkError>,
    },
    JoinRequested(Result<JoinAccepted, NetworkError>),
}

enum Event {
    Shutdown,
    Datagram(Result<(Vec<u8>, String), NetworkError>),
    Request(NodeRequest),
    Background(Background),
    Readiness,
    Tick,
}

/// Cloneable client for the runtime task.
#[derive(Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<NodeRequest>,
}

impl NodeHandle {
    async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> NodeRequest,
    ) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    pub async fn network(&self) -> Result<Vec<Peer>, NodeError> {
        self.ask(NodeRequest::Network).await
    }

    pub async fn peers(&self) -> Result<Vec<PeerStatus>, NodeError> {
        self.ask(NodeRequest::Peers).await
    }

    pub async fn gossip(&self) -> Result<Vec<GossipEntry>, NodeError> {
        self.ask(NodeRequest::Gossip).await
    }

    pub async fn stack(&self) -> Result<Vec<Transaction>, NodeError> {
        self.ask(NodeRequest::Stack).await
    }

    pub async fn pool_transactions(&self) -> Result<Vec<Transaction>, NodeError> {
        self.ask(NodeRequest::PoolTransactions).await
    }

    pub async fn pool_blocks(&self) -> Result<Vec<Block>, NodeError> {
        self.ask(NodeRequest::PoolBlocks).await
    }

    pub async fn pool_votes(&self) -> Result<Vec<AttestationSummary>, NodeError> {
        self.ask(NodeRequest::PoolVotes).await
    }

    pub async fn pool_commits(&self) -> Result<Vec<AttestationSummary>, NodeError> {
        self.ask(NodeRequest::PoolCommits).await
    }

    pub async fn genesis(&self) -> Result<Block, NodeError> {
        self.ask(NodeRequest::Genesis).await
    }

    pub async fn latest(&self) -> Result<Block, NodeError> {
        self.ask(NodeRequest::Latest).await
    }

    pub async fn sync(&self, height: u64) -> Result<Option<Vec<Block>>, NodeError> {
        self.ask(|reply| NodeRequest::Sync { height, reply }).await
    }

    pub async fn blocks(&self, gte: u64, lte: u64, limit: u64) -> Result<Vec<Block>, NodeError> {
        self.ask(|reply| NodeRequest::Blocks {
            gte,
            lte,
            limit,
            reply,
        })
        .await?
    }

    pub async fn block_page(&self, page: u64, size: u64) -> Result<Vec<Block>, NodeError> {
        self.ask(|reply| NodeRequest::BlockPage { page, size, reply })
            .await
    }

    pub async fn transaction(
        &self,
        origin: PublicKey,
        ident: String,
    ) -> Result<Option<Transaction>, NodeError> {
        self.ask(|reply| NodeRequest::Transaction {
            origin,
            ident,
            reply,
        })
        .await
    }

    pub async fn submit(
        &self,
        commands: Vec<Command>,
        ident: Option<String>,
    ) -> Result<Transaction, NodeError> {
        self.ask(|reply| NodeRequest::Submit {
            commands,
            ident,
            reply,
        })
        .await?
    }

    pub async fn join(
        &self,
        public_key: PublicKey,
        address: String,
        http: String,
    ) -> Result<JoinAccepted, NodeError> {
        self.ask(|reply| NodeRequest::Join {
            public_key,
            address,
            http,
            reply,
        })
        .await?
    }

    pub async fn challenge(&self, token: String) -> Result<ChallengeAnswer, NodeError> {
        self.ask(|reply| NodeRequest::Challenge { token, reply })
            .await?
    }
}

pub struct NodeRuntime<T: DatagramTransport> {
    node: ShroudNode,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    fetcher: ApiFetcher,
    shutdown: ShutdownController,
    requests: mpsc::Receiver<NodeRequest>,
    events_tx: mpsc::UnboundedSender<Background>,
    events_rx: mpsc::UnboundedReceiver<Background>,
}

impl<T: DatagramTransport> NodeRuntime<T> {
    pub fn new(
        node: ShroudNode,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        fetcher: ApiFetcher,
        shutdown: ShutdownController,
    ) -> (Self, NodeHandle) {
        let (tx, requests) = mpsc::channel(REQUEST_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            node,
            transport,
            clock,
            fetcher,
            shutdown,
            requests,
            events_tx,
            events_rx,
        };
        (runtime, NodeHandle { tx })
    }

    /// Run until shutdown is signalled. Fails if the network never becomes
    /// ready or the transport keeps failing to receive.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let transport = Arc::clone(&self.transport);
        self.node.set_bound(true);
        self.node.start(self.clock.now_ms());
        self.spawn_bootstrap();
        tracing::info!(address = %transport.local_address(), "node runtime started");

        let mut readiness = tokio::time::interval(READINESS_POLL);
        let mut ready = false;
        let mut receive_failures = 0u32;
        loop {
            let wait = self.idle_wait();
            let event = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => Event::Shutdown,
                received = transport.recv_from() => Event::Datagram(received),
                Some(req) = self.requests.recv() => Event::Request(req),
                Some(ev) = self.events_rx.recv() => Event::Background(ev),
                _ = readiness.tick(), if !ready => Event::Readiness,
                _ = tokio::time::sleep(wait) => Event::Tick,
            };

            let now = self.clock.now_ms();
            match event {
                Event::Shutdown => break,
                Event::Datagram(Ok((frame, from))) => {
                    receive_failures = 0;
                    if let Err(e) = self.node.handle_datagram(&from, &frame, now) {
                        tracing::warn!(from, error = %e, "datagram handling failed");
                    }
                }
                Event::Datagram(Err(e)) => {
                    receive_failures += 1;
                    if receive_failures >= TRANSPORT_ERROR_BUDGET {
                        tracing::error!(error = %e, failures = receive_failures, "transport failed");
                        self.node.shutdown();
                        return Err(NetworkError::Transport(format!(
                            "{receive_failures} consecutive receive failures, last: {e}"
                        ))
                        .into());
                    }
                    tracing::warn!(error = %e, failures = receive_failures, "transport receive failed");
                    tokio::time::sleep(TRANSPORT_BACKOFF).await;
                }
                Event::Request(req) => self.handle_request(req, now),
                Event::Background(ev) => self.handle_background(ev, now),
                Event::Readiness => match self.node.check_readiness() {
                    Ok(Readiness::Ready) => {
                        ready = true;
                        tracing::info!(peers = self.node.network().len(), "network ready");
                    }
                    Ok(Readiness::Waiting { attempt }) => {
                        tracing::debug!(attempt, "waiting for network");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "network never became ready");
                        self.node.shutdown();
                        return Err(e);
                    }
                },
                Event::Tick => {
                    if let Err(e) = self.node.tick(now) {
                        tracing::warn!(error = %e, "timer handling failed");
                    }
                }
            }
            self.flush().await;
        }

        self.node.shutdown();
        tracing::info!("node runtime stopped");
        Ok(())
    }

    fn idle_wait(&self) -> Duration {
        let now = self.clock.now_ms();
        match self.node.next_deadline() {
            Some(at) => Duration::from_millis(at.saturating_sub(now)).min(MAX_IDLE),
            None => MAX_IDLE,
        }
    }

    async fn flush(&mut self) {
        let verbose = self.node.config().network_verbose_logging;
        for out in self.node.drain_outbound() {
            if let Err(e) = self.transport.send_to(&out.to, &out.frame).await {
                if verbose {
                    tracing::debug!(to = %out.to, error = %e, "send failed");
                }
            }
        }
    }

    fn spawn_bootstrap(&self) {
        let Some(url) = self.node.config().bootstrap.clone() else {
            return;
        };
        let fetcher = self.fetcher.clone();
        let events = self.events_tx.clone();
        let shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let peers = poll_bootstrap(fetcher, url, BOOTSTRAP_POLL_INTERVAL, shutdown_rx).await;
            let _ = events.send(Background::Bootstrap(peers));
        });
    }

    fn handle_request(&mut self, req: NodeRequest, now: u64) {
        match req {
            NodeRequest::Network(reply) => {
                let _ = reply.send(self.node.network());
            }
            NodeRequest::Peers(reply) => {
                let _ = reply.send(self.node.peers());
            }
            NodeRequest::Gossip(reply) => {
                let _ = reply.send(self.node.gossip());
            }
            NodeRequest::Stack(reply) => {
                let _ = reply.send(self.node.stack());
            }
            NodeRequest::PoolTransactions(reply) => {
                let _ = reply.send(self.node.pooled_transactions());
            }
            NodeRequest::PoolBlocks(reply) => {
                let _ = reply.send(self.node.pooled_blocks());
            }
            NodeRequest::PoolVotes(reply) => {
                let _ = reply.send(self.node.votes());
            }
            NodeRequest::PoolCommits(reply) => {
                let _ = reply.send(self.node.commits());
            }
            NodeRequest::Genesis(reply) => {
                let _ = reply.send(self.node.genesis());
            }
            NodeRequest::Latest(reply) => {
                let _ = reply.send(self.node.latest());
            }
            NodeRequest::Sync { height, reply } => {
                let _ = reply.send(self.node.sync_blocks(height));
            }
            NodeRequest::Blocks {
                gte,
                lte,
                limit,
                reply,
            } => {
                let _ = reply.send(self.node.blocks(gte, lte, limit));
            }
            NodeRequest::BlockPage { page, size, reply } => {
                let _ = reply.send(self.node.block_page(page, size));
            }
            NodeRequest::Transaction {
                origin,
                ident,
                reply,
            } => {
                let _ = reply.send(self.node.find_transaction(&origin, &ident));
            }
            NodeRequest::Submit {
                commands,
                ident,
                reply,
            } => {
                let _ = reply.send(self.node.submit_transaction(commands, ident.as_deref(), now));
            }
            NodeRequest::Join {
                public_key,
                address,
                http,
                reply,
            } => {
                let result = self
                    .node
                    .register_join(public_key, &address, &http, now)
                    .map(|challenge| {
                        let fetcher = self.fetcher.clone();
                        let events = self.events_tx.clone();
                        tokio::spawn(async move {
                            let answer = fetcher
                                .fetch_json::<ChallengeAnswer>(&challenge.url, &[])
                                .await;
                            let _ = events.send(Background::ChallengeAnswered {
                                token: challenge.token,
                                answer,
                            });
                        });
                        JoinAccepted {
                            address,
                            public_key,
                        }
                    });
                let _ = reply.send(result);
            }
            NodeRequest::Challenge { token, reply } => {
                let _ = reply.send(self.node.answer_challenge(&token, now));
            }
        }
    }

    fn handle_background(&mut self, ev: Background, now: u64) {
        match ev {
            Background::Bootstrap(None) => {}
            Background::Bootstrap(Some(peers)) => {
                self.node.seed_network(peers.clone());
                if !self.node.is_member() {
                    self.request_join(peers);
                }
            }
            Background::ChallengeAnswered {
                token,
                answer: Ok(answer),
            } => {
                if let Err(e) = self.node.complete_join(&token, &answer, now) {
                    tracing::warn!(error = %e, "join rejected");
                }
            }
            Background::ChallengeAnswered {
                token,
                answer: Err(e),
            } => {
                tracing::warn!(error = %e, "challenge fetch failed");
                self.node.abandon_join(&token);
            }
            Background::JoinRequested(Ok(accepted)) => {
                tracing::info!(address = %accepted.address, "join request accepted, awaiting admission");
            }
            Background::JoinRequested(Err(e)) => {
                tracing::warn!(error = %e, "join request failed");
            }
        }
    }

    /// Ask a member of the seeded network to admit us.
    fn request_join(&self, peers: Vec<Peer>) {
        let config = self.node.config();
        let endpoint = format!(
            "join/{}/{}/{}",
            config.http,
            config.address,
            self.node.public_key()
        );
        let fetcher = self.fetcher.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetcher.fetch_json::<JoinAccepted>(&endpoint, &peers).await;
            let _ = events.send(Background::JoinRequested(result));
        });
    }
}
