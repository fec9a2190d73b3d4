//! Admission gate for inbound envelopes.
//!
//! Every envelope is checked against its own signature and ident before the
//! payload-specific rules run. Nothing here panics or logs; callers decide.

use shroud_crypto::is_token;
use shroud_ledger::Block;
use shroud_messages::{votes_verify, Envelope, Payload, CHALLENGE_TOKEN_LEN};
use shroud_network::Admission;

use crate::error::ValidationFailure;
use crate::quorum::{QuorumPolicy, QuorumStatus, StakeTable};

pub fn check_message(
    envelope: &Envelope,
    stakes: &StakeTable,
    policy: &QuorumPolicy,
) -> Result<(), ValidationFailure> {
    if envelope.broadcast != envelope.msg_type().is_broadcast() {
        return Err(ValidationFailure::BroadcastMismatch);
    }
    let expected = envelope.payload.ident();
    if envelope.ident != expected {
        return Err(ValidationFailure::IdentMismatch {
            expected,
            actual: envelope.ident.clone(),
        });
    }
    if !envelope.verify_signature() {
        return Err(ValidationFailure::BadSignature);
    }

    match &envelope.payload {
        Payload::Auth(auth) => {
            if !auth.verify(&envelope.origin) {
                return Err(ValidationFailure::BadAuth);
            }
        }
        Payload::Challenge(challenge) => {
            if !is_token(&challenge.token, CHALLENGE_TOKEN_LEN, CHALLENGE_TOKEN_LEN) {
                return Err(ValidationFailure::BadToken);
            }
        }
        Payload::Proposal(block) => {
            check_block(block)?;
            if !block.votes.is_empty() {
                return Err(ValidationFailure::VotesAttached);
            }
        }
        Payload::Vote(vote) => {
            if vote.origin != envelope.origin {
                return Err(ValidationFailure::OriginMismatch);
            }
            if !vote.block.votes.is_empty() {
                return Err(ValidationFailure::VotesAttached);
            }
            if !vote.is_valid() {
                return Err(ValidationFailure::InvalidVote);
            }
        }
        Payload::Commit(commit) => {
            if commit.origin != envelope.origin {
                return Err(ValidationFailure::OriginMismatch);
            }
            check_block(&commit.block)?;
            if !commit.verify() {
                return Err(ValidationFailure::InvalidCommit);
            }
            check_vote_set(&commit.block, stakes, policy)?;
        }
        Payload::Sync(block) => {
            check_block(block)?;
            check_vote_set(block, stakes, policy)?;
        }
    }
    Ok(())
}

pub fn validate_message(envelope: &Envelope, stakes: &StakeTable, policy: &QuorumPolicy) -> bool {
    check_message(envelope, stakes, policy).is_ok()
}

fn check_block(block: &Block) -> Result<(), ValidationFailure> {
    block
        .check()
        .map_err(|e| ValidationFailure::InvalidBlock(e.to_string()))
}

/// Every attached vote signs the hash and together they carry quorum.
fn check_vote_set(
    block: &Block,
    stakes: &StakeTable,
    policy: &QuorumPolicy,
) -> Result<(), ValidationFailure> {
    if !votes_verify(block) {
        return Err(ValidationFailure::InvalidVote);
    }
    let weight = stakes.weight_of(block.votes.iter().map(|v| &v.origin));
    match policy.status(weight, stakes.total()) {
        QuorumStatus::Reached { .. } => Ok(()),
        QuorumStatus::Pending { weight, need } => Err(ValidationFailure::BelowQuorum {
            have: weight,
            need,
        }),
    }
}

/// The gate as installed in front of the network engine. The stake table is
/// replaced whenever the chain advances.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    stakes: StakeTable,
    policy: QuorumPolicy,
}

impl Validator {
    pub fn new(stakes: StakeTable, policy: QuorumPolicy) -> Self {
        Self { stakes, policy }
    }

    pub fn set_stakes(&mut self, stakes: StakeTable) {
        self.stakes = stakes;
    }

    pub fn stakes(&self) -> &StakeTable {
        &self.stakes
    }

    pub fn check(&self, envelope: &Envelope) -> Result<(), ValidationFailure> {
        check_message(envelope, &self.stakes, &self.policy)
    }
}

impl Admission for Validator {
    fn admit(&self, envelope: &Envelope) -> bool {
        validate_message(envelope, &self.stakes, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_crypto::{random_token, KeyWallet, Wallet};
    use shroud_ledger::{genesis_block, Command, GenesisPeer, Transaction};
    use shroud_messages::{Auth, Challenge, Commit, EnvelopeFactory, Vote};
    use shroud_store::{MemoryChain, PeerDirectory};

    const NOW: u64 = 1_700_000_000_000;

    fn wallets() -> Vec<KeyWallet> {
        (1..=4u8).map(|i| KeyWallet::from_seed(&[i; 32])).collect()
    }

    fn setup() -> (Vec<KeyWallet>, MemoryChain, StakeTable) {
        let ws = wallets();
        let peers: Vec<GenesisPeer> = ws
            .iter()
            .enumerate()
            .map(|(i, w)| GenesisPeer {
                public_key: w.public_key(),
                address: format!("n{i}:1"),
                http: format!("n{i}:2"),
                stake: 1000,
            })
            .collect();
        let chain = MemoryChain::from_genesis(genesis_block(&peers).unwrap()).unwrap();
        let stakes = StakeTable::from_directory(&chain);
        (ws, chain, stakes)
    }

    fn next_block(w: &KeyWallet, chain: &MemoryChain) -> Block {
        let tx = Transaction::create(
            w,
            vec![Command::Data {
                seq: 1,
                ns: "test".into(),
                data: "x".into(),
            }],
            None,
            NOW,
        )
        .unwrap();
        Block::next(chain.latest(), vec![tx]).unwrap()
    }

    fn wrap(w: &KeyWallet, payload: Payload) -> Envelope {
        EnvelopeFactory::new().create(w, payload, NOW).unwrap()
    }

    fn check(env: &Envelope, stakes: &StakeTable) -> Result<(), ValidationFailure> {
        check_message(env, stakes, &QuorumPolicy::default())
    }

    #[test]
    fn proposal_accepted_and_tamper_rejected() {
        let (ws, chain, stakes) = setup();
        let block = next_block(&ws[0], &chain);
        let env = wrap(&ws[0], Payload::Proposal(block));
        assert_eq!(check(&env, &stakes), Ok(()));

        let mut relayed = env.clone();
        relayed.seq += 1;
        assert_eq!(check(&relayed, &stakes), Err(ValidationFailure::BadSignature));
    }

    #[test]
    fn ident_must_match_payload() {
        let (ws, chain, stakes) = setup();
        let mut env = wrap(&ws[0], Payload::Proposal(next_block(&ws[0], &chain)));
        env.ident = "3deadbeef".into();
        assert!(matches!(
            check(&env, &stakes),
            Err(ValidationFailure::IdentMismatch { .. })
        ));
    }

    #[test]
    fn challenge_token_shape() {
        let (ws, _, stakes) = setup();
        let good = wrap(&ws[0], Payload::Challenge(Challenge { token: random_token(26) }));
        let short = wrap(&ws[0], Payload::Challenge(Challenge { token: "abc".into() }));
        assert_eq!(check(&good, &stakes), Ok(()));
        assert_eq!(check(&short, &stakes), Err(ValidationFailure::BadToken));
    }

    #[test]
    fn auth_must_be_signed_by_origin() {
        let (ws, _, stakes) = setup();
        let token = random_token(26);
        let own = wrap(&ws[0], Payload::Auth(Auth::create(&ws[0], &token)));
        let borrowed = wrap(&ws[1], Payload::Auth(Auth::create(&ws[0], &token)));
        assert_eq!(check(&own, &stakes), Ok(()));
        assert_eq!(check(&borrowed, &stakes), Err(ValidationFailure::BadAuth));
    }

    #[test]
    fn vote_origin_must_match_envelope() {
        let (ws, chain, stakes) = setup();
        let block = next_block(&ws[0], &chain);
        let vote = Vote::create(&ws[1], block);
        assert_eq!(check(&wrap(&ws[1], Payload::Vote(vote.clone())), &stakes), Ok(()));
        assert_eq!(
            check(&wrap(&ws[2], Payload::Vote(vote)), &stakes),
            Err(ValidationFailure::OriginMismatch)
        );
    }

    #[test]
    fn vote_over_mutated_block_rejected() {
        let (ws, chain, stakes) = setup();
        let mut block = next_block(&ws[0], &chain);
        let vote = Vote::create(&ws[1], block.clone());
        block.transactions[0].timestamp += 1;
        let forged = Vote { block, ..vote };
        assert_eq!(
            check(&wrap(&ws[1], Payload::Vote(forged)), &stakes),
            Err(ValidationFailure::InvalidVote)
        );
    }

    #[test]
    fn commit_needs_vote_quorum() {
        let (ws, chain, stakes) = setup();
        let block = next_block(&ws[0], &chain);
        // 4 × 1000 stake, 67% → 2680 → three distinct voters
        let votes = |n: usize| -> Vec<_> {
            ws.iter()
                .take(n)
                .map(|w| Vote::create(w, block.clone()).signature())
                .collect()
        };

        let short = Commit::create(&ws[0], block.with_votes(votes(2))).unwrap();
        assert_eq!(
            check(&wrap(&ws[0], Payload::Commit(short)), &stakes),
            Err(ValidationFailure::BelowQuorum { have: 2000, need: 2680 })
        );

        let mut repeated = votes(2);
        repeated.push(repeated[0].clone());
        let padded = Commit::create(&ws[0], block.with_votes(repeated)).unwrap();
        assert!(matches!(
            check(&wrap(&ws[0], Payload::Commit(padded)), &stakes),
            Err(ValidationFailure::BelowQuorum { .. })
        ));

        let full = Commit::create(&ws[0], block.with_votes(votes(3))).unwrap();
        assert_eq!(check(&wrap(&ws[0], Payload::Commit(full)), &stakes), Ok(()));
    }

    #[test]
    fn commit_signature_covers_vote_set() {
        let (ws, chain, stakes) = setup();
        let block = next_block(&ws[0], &chain);
        let votes: Vec<_> = ws
            .iter()
            .map(|w| Vote::create(w, block.clone()).signature())
            .collect();
        let mut commit = Commit::create(&ws[0], block.with_votes(votes[..3].to_vec())).unwrap();
        commit.block.votes.push(votes[3].clone());
        assert_eq!(
            check(&wrap(&ws[0], Payload::Commit(commit)), &stakes),
            Err(ValidationFailure::InvalidCommit)
        );
    }

    #[test]
    fn sync_block_needs_quorum_evidence() {
        let (ws, chain, stakes) = setup();
        let block = next_block(&ws[0], &chain);
        let bare = wrap(&ws[0], Payload::Sync(block.clone()));
        assert!(matches!(
            check(&bare, &stakes),
            Err(ValidationFailure::BelowQuorum { have: 0, .. })
        ));
        let votes = ws
            .iter()
            .map(|w| Vote::create(w, block.clone()).signature())
            .collect();
        let proven = wrap(&ws[0], Payload::Sync(block.with_votes(votes)));
        assert_eq!(check(&proven, &stakes), Ok(()));
    }

    #[test]
    fn validator_admits_through_the_network_gate() {
        let (ws, chain, stakes) = setup();
        let validator = Validator::new(stakes, QuorumPolicy::default());
        let env = wrap(&ws[2], Payload::Proposal(next_block(&ws[2], &chain)));
        assert!(validator.admit(&env));
        assert_eq!(validator.stakes().total(), chain.peers().len() as u64 * 1000);
    }
}
