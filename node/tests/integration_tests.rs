//! Integration tests running several nodes in-process.
//!
//! Frames are routed between [`ShroudNode`]s by datagram address on a shared
//! manual clock, so finalization, relaying, catch-up and joins run through
//! the same code paths as on the wire without sockets or timers.

use std::collections::HashMap;
use std::sync::Arc;

use shroud_crypto::{KeyWallet, Wallet};
use shroud_ledger::{genesis_block, Block, Command, GenesisPeer};
use shroud_node::{NodeConfig, NodeMetrics, ShroudNode};
use shroud_store::Peer;

const NOW: u64 = 1_700_000_000_000;
const STEP_MS: u64 = 500;
const MEMBERS: u8 = 7;

fn wallet(i: u8) -> KeyWallet {
    KeyWallet::from_seed(&[i + 1; 32])
}

fn address(i: u8) -> String {
    format!("10.0.0.{i}:17468")
}

fn http(i: u8) -> String {
    format!("10.0.0.{i}:17469")
}

fn genesis() -> Block {
    let peers: Vec<GenesisPeer> = (0..MEMBERS)
        .map(|i| GenesisPeer {
            public_key: wallet(i).public_key(),
            address: address(i),
            http: http(i),
            stake: 1000,
        })
        .collect();
    genesis_block(&peers).unwrap()
}

fn node(i: u8, genesis: &Block) -> ShroudNode {
    let config = NodeConfig {
        address: address(i),
        http: http(i),
        ..NodeConfig::default()
    };
    ShroudNode::new(
        config,
        Box::new(wallet(i)),
        genesis.clone(),
        Arc::new(NodeMetrics::new().unwrap()),
        u64::from(i) + 100,
    )
    .unwrap()
}

struct Cluster {
    nodes: Vec<ShroudNode>,
    online: Vec<bool>,
    by_address: HashMap<String, usize>,
    now: u64,
}

impl Cluster {
    fn new() -> Self {
        let genesis = genesis();
        let mut nodes: Vec<ShroudNode> = (0..MEMBERS).map(|i| node(i, &genesis)).collect();
        for n in &mut nodes {
            n.set_bound(true);
            n.start(NOW);
        }
        Self {
            online: vec![true; nodes.len()],
            by_address: (0..MEMBERS).map(|i| (address(i), usize::from(i))).collect(),
            nodes,
            now: NOW,
        }
    }

    /// Deliver queued frames until every outbox is empty.
    fn pump(&mut self) {
        loop {
            let mut frames = Vec::new();
            for (i, n) in self.nodes.iter_mut().enumerate() {
                for out in n.drain_outbound() {
                    frames.push((i, out));
                }
            }
            if frames.is_empty() {
                return;
            }
            for (from, out) in frames {
                let Some(&to) = self.by_address.get(&out.to) else {
                    continue;
                };
                if !self.online[from] || !self.online[to] {
                    continue;
                }
                let from_addr = address(from as u8);
                self.nodes[to]
                    .handle_datagram(&from_addr, &out.frame, self.now)
                    .unwrap();
            }
        }
    }

    fn step(&mut self) {
        self.now += STEP_MS;
        for i in 0..self.nodes.len() {
            if self.online[i] {
                self.nodes[i].tick(self.now).unwrap();
            }
        }
        self.pump();
    }

    /// Step until `done` holds. Returns false if it never did.
    fn run_until(&mut self, max_steps: usize, done: impl Fn(&Cluster) -> bool) -> bool {
        for _ in 0..max_steps {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    fn heights(&self) -> Vec<u64> {
        self.nodes.iter().map(|n| n.height()).collect()
    }
}

fn data(value: &str) -> Vec<Command> {
    vec![Command::Data {
        seq: 1,
        ns: "itest".into(),
        data: value.into(),
    }]
}

#[test]
fn transaction_is_finalized_on_every_member() {
    let mut cluster = Cluster::new();
    let tx = cluster.nodes[0]
        .submit_transaction(data("hello"), Some("greeting"), cluster.now)
        .unwrap();

    let done = cluster.run_until(400, |c| c.heights().iter().all(|&h| h >= 1));
    assert!(done, "heights stuck at {:?}", cluster.heights());

    let latest = cluster.nodes[0].latest();
    assert_eq!(latest.height, 1);
    // a finalized block carries the vote quorum that sealed it
    assert!(latest.votes.len() >= 5);
    for n in &cluster.nodes {
        assert_eq!(n.latest().hash, latest.hash);
        let found = n.find_transaction(&wallet(0).public_key(), "greeting");
        assert_eq!(found.as_ref(), Some(&tx));
        assert!(n.pooled_blocks().is_empty());
        assert_eq!(n.metrics().chain_height.get(), 1);
    }
    assert!(cluster.nodes[0].stack().is_empty());
    assert!(cluster.nodes[0].pooled_transactions().is_empty());
    assert_eq!(cluster.nodes[0].metrics().blocks_finalized.get(), 1);
}

#[test]
fn offline_member_catches_up_through_pings() {
    let mut cluster = Cluster::new();
    cluster.online[6] = false;
    cluster.nodes[1]
        .submit_transaction(data("while away"), None, cluster.now)
        .unwrap();

    assert!(cluster.run_until(400, |c| c.heights()[..6].iter().all(|&h| h == 1)));
    assert_eq!(cluster.nodes[6].height(), 0);

    cluster.online[6] = true;
    assert!(
        cluster.run_until(400, |c| c.nodes[6].height() == 1),
        "member 6 never caught up"
    );
    assert_eq!(cluster.nodes[6].latest().hash, cluster.nodes[0].latest().hash);
    assert_eq!(
        cluster.nodes[0].sync_blocks(1).unwrap()[0].hash,
        cluster.nodes[0].latest().hash
    );
}

#[test]
fn consecutive_blocks_extend_the_chain() {
    let mut cluster = Cluster::new();
    cluster.nodes[2]
        .submit_transaction(data("one"), Some("one"), cluster.now)
        .unwrap();
    assert!(cluster.run_until(400, |c| c.heights().iter().all(|&h| h >= 1)));

    cluster.nodes[4]
        .submit_transaction(data("two"), Some("two"), cluster.now)
        .unwrap();
    assert!(cluster.run_until(400, |c| c.heights().iter().all(|&h| h >= 2)));

    let chain = cluster.nodes[5].blocks(0, 0, 0).unwrap();
    assert_eq!(chain.iter().map(|b| b.height).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(chain[2].previous_hash, chain[1].hash);
    let page = cluster.nodes[5].block_page(1, 2);
    assert_eq!(page.iter().map(|b| b.height).collect::<Vec<_>>(), vec![2, 1]);
}

#[test]
fn competing_proposals_both_finalize() {
    let mut cluster = Cluster::new();
    let now = cluster.now;
    let first = cluster.nodes[0]
        .submit_transaction(data("from zero"), Some("zero"), now)
        .unwrap();
    let second = cluster.nodes[1]
        .submit_transaction(data("from one"), Some("one"), now)
        .unwrap();

    // one proposal wins the height, the other is re-proposed above it
    let done = cluster.run_until(800, |c| c.heights().iter().all(|&h| h >= 2));
    assert!(done, "heights stuck at {:?}", cluster.heights());

    for n in &cluster.nodes {
        assert_eq!(n.latest().hash, cluster.nodes[0].latest().hash);
        let zero = n.find_transaction(&wallet(0).public_key(), "zero");
        let one = n.find_transaction(&wallet(1).public_key(), "one");
        assert_eq!(zero.as_ref(), Some(&first));
        assert_eq!(one.as_ref(), Some(&second));
    }
    let chain = cluster.nodes[2].blocks(1, 2, 0).unwrap();
    assert!(chain.iter().all(|b| b.transactions.len() == 1));
    assert!(cluster.nodes[0].stack().is_empty());
    assert!(cluster.nodes[1].stack().is_empty());
}

#[test]
fn joiner_is_admitted_through_challenge() {
    let mut cluster = Cluster::new();
    let joiner_wallet = KeyWallet::from_seed(&[42; 32]);
    let mut joiner = ShroudNode::new(
        NodeConfig {
            address: "10.0.0.42:17468".into(),
            http: "10.0.0.42:17469".into(),
            ..NodeConfig::default()
        },
        Box::new(KeyWallet::from_seed(&[42; 32])),
        genesis(),
        Arc::new(NodeMetrics::new().unwrap()),
        42,
    )
    .unwrap();
    assert!(!joiner.is_member());

    let now = cluster.now;
    let challenge = cluster.nodes[3]
        .register_join(joiner_wallet.public_key(), "10.0.0.42:17468", "10.0.0.42:17469", now)
        .unwrap();
    assert!(challenge.url.starts_with("http://10.0.0.42:17469/challenge/"));
    let answer = joiner.answer_challenge(&challenge.token, now).unwrap();
    let tx = cluster.nodes[3]
        .complete_join(&challenge.token, &answer, now)
        .unwrap();
    assert!(matches!(tx.commands[0], Command::AddPeer { .. }));

    assert!(cluster.run_until(400, |c| c.heights().iter().all(|&h| h >= 1)));
    for n in &cluster.nodes {
        let admitted: Vec<Peer> = n
            .network()
            .into_iter()
            .filter(|p| p.public_key == joiner_wallet.public_key())
            .collect();
        assert_eq!(admitted.len(), 1);
        assert_eq!(admitted[0].address, "10.0.0.42:17468");
        assert_eq!(admitted[0].stake, 0);
    }

    // a second join for the same key is refused once it is a peer
    let again = cluster.nodes[0].register_join(
        joiner_wallet.public_key(),
        "10.0.0.42:17468",
        "10.0.0.42:17469",
        cluster.now,
    );
    assert!(again.is_err());
}

#[test]
fn forged_challenge_answer_stacks_nothing() {
    let mut cluster = Cluster::new();
    let claimed = KeyWallet::from_seed(&[50; 32]);
    let mut impostor = node(5, &genesis());

    let now = cluster.now;
    let challenge = cluster.nodes[0]
        .register_join(claimed.public_key(), "10.0.0.50:17468", "10.0.0.50:17469", now)
        .unwrap();
    let answer = impostor.answer_challenge(&challenge.token, now).unwrap();
    assert!(cluster.nodes[0]
        .complete_join(&challenge.token, &answer, now)
        .is_err());
    assert!(cluster.nodes[0].stack().is_empty());
}
