use std::collections::BTreeSet;

use proptest::prelude::*;

use shroud_consensus::{QuorumPolicy, StakeTable, VotePool};
use shroud_crypto::{KeyWallet, Wallet};
use shroud_ledger::{genesis_block, Block, Command, GenesisPeer, Transaction};
use shroud_messages::Vote;
use shroud_store::Peer;

const MEMBERS: u8 = 9;

fn wallets() -> Vec<KeyWallet> {
    (1..=MEMBERS).map(|i| KeyWallet::from_seed(&[i; 32])).collect()
}

fn block(w: &KeyWallet) -> Block {
    let genesis = genesis_block(&[GenesisPeer {
        public_key: w.public_key(),
        address: "a:1".into(),
        http: "a:2".into(),
        stake: 1000,
    }])
    .unwrap();
    let tx = Transaction::create(w, vec![Command::TestLoad { seq: 1, timestamp: 0 }], Some("q"), 1)
        .unwrap();
    Block::next(&genesis, vec![tx]).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Quorum is reached exactly when the distinct voters carry enough stake,
    /// however often each of them repeats.
    #[test]
    fn quorum_tracks_distinct_voters(
        voters in prop::collection::vec(0usize..MEMBERS as usize, 1..40),
        stakes in prop::collection::vec(1u64..500, MEMBERS as usize),
        bps in 5_001u32..=10_000,
    ) {
        let ws = wallets();
        let peers: Vec<Peer> = ws
            .iter()
            .zip(&stakes)
            .map(|(w, &stake)| Peer {
                public_key: w.public_key(),
                address: String::new(),
                http: String::new(),
                stake,
            })
            .collect();
        let table = StakeTable::from_peers(&peers);
        let policy = QuorumPolicy::new(bps);
        let b = block(&ws[0]);

        let mut pool = VotePool::new();
        let mut seen = BTreeSet::new();
        for i in voters {
            seen.insert(i);
            let status = pool.add(&Vote::create(&ws[i], b.clone()), &table, &policy);
            let weight: u64 = seen.iter().map(|&j| stakes[j]).sum();
            prop_assert_eq!(status.is_reached(), weight >= policy.threshold(table.total()));
        }
    }

    /// Flipping any byte of the block content invalidates a vote.
    #[test]
    fn vote_binds_block_content(data in "[a-z]{1,32}", flip in any::<prop::sample::Index>()) {
        let w = KeyWallet::from_seed(&[7; 32]);
        let genesis = genesis_block(&[GenesisPeer {
            public_key: w.public_key(),
            address: "a:1".into(),
            http: "a:2".into(),
            stake: 1000,
        }])
        .unwrap();
        let cmd = Command::Data { seq: 1, ns: "prop".into(), data: data.clone() };
        let tx = Transaction::create(&w, vec![cmd], Some("v"), 1).unwrap();
        let vote = Vote::create(&w, Block::next(&genesis, vec![tx]).unwrap());
        prop_assert!(vote.is_valid());

        let mut bytes = data.into_bytes();
        let i = flip.index(bytes.len());
        bytes[i] = if bytes[i] == b'z' { b'a' } else { bytes[i] + 1 };
        let mut forged = vote.clone();
        forged.block.transactions[0].commands[0] = Command::Data {
            seq: 1,
            ns: "prop".into(),
            data: String::from_utf8(bytes).unwrap(),
        };
        prop_assert!(!forged.is_valid());
    }
}
