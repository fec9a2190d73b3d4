//! Gossip fan-out order.
//!
//! A randomized permutation of the peer set, excluding the local node,
//! rebuilt on the morph interval or when membership changes. Locally
//! authored envelopes go to the whole order; relayed envelopes go to a
//! small random subset that never includes the origin or the peer the
//! envelope came from, so relayed traffic decays hop by hop.

use rand::seq::SliceRandom;
use rand::Rng;
use shroud_types::PublicKey;

/// Relays a non-authored envelope reaches per hop.
pub const RELAY_FANOUT: usize = 2;

#[derive(Debug, Default)]
pub struct GossipOrder {
    order: Vec<PublicKey>,
}

impl GossipOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from `members`, dropping `identity`.
    pub fn reshuffle<R: Rng>(&mut self, members: &[PublicKey], identity: &PublicKey, rng: &mut R) {
        self.order = members.iter().filter(|pk| *pk != identity).copied().collect();
        self.order.sort();
        self.order.dedup();
        self.order.shuffle(rng);
    }

    /// Whether the order covers exactly `members` (minus `identity`).
    pub fn covers(&self, members: &[PublicKey], identity: &PublicKey) -> bool {
        let mut want: Vec<&PublicKey> = members.iter().filter(|pk| *pk != identity).collect();
        want.sort();
        want.dedup();
        let mut have: Vec<&PublicKey> = self.order.iter().collect();
        have.sort();
        want == have
    }

    pub fn as_slice(&self) -> &[PublicKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Targets for an envelope the local node authored.
    pub fn authored_targets(&self) -> Vec<PublicKey> {
        self.order.clone()
    }

    /// Up to `fanout` random targets for a relayed envelope.
    pub fn relay_targets<R: Rng>(
        &self,
        origin: &PublicKey,
        sender: &PublicKey,
        fanout: usize,
        rng: &mut R,
    ) -> Vec<PublicKey> {
        let eligible: Vec<PublicKey> = self
            .order
            .iter()
            .filter(|pk| *pk != origin && *pk != sender)
            .copied()
            .collect();
        eligible.choose_multiple(rng, fanout).copied().collect()
    }

    /// Up to `count` random peers, for a ping round.
    pub fn sample<R: Rng>(&self, count: usize, rng: &mut R) -> Vec<PublicKey> {
        self.order.choose_multiple(rng, count).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn keys(n: u8) -> Vec<PublicKey> {
        (0..n).map(|i| PublicKey([i; 32])).collect()
    }

    #[test]
    fn order_excludes_self() {
        let mut rng = StdRng::seed_from_u64(1);
        let members = keys(7);
        let mut g = GossipOrder::new();
        g.reshuffle(&members, &members[3], &mut rng);
        assert_eq!(g.len(), 6);
        assert!(!g.as_slice().contains(&members[3]));
        assert!(g.covers(&members, &members[3]));
        assert!(!g.covers(&keys(8), &members[3]));
    }

    #[test]
    fn relay_excludes_origin_and_sender() {
        let mut rng = StdRng::seed_from_u64(2);
        let members = keys(7);
        let mut g = GossipOrder::new();
        g.reshuffle(&members, &members[0], &mut rng);
        for _ in 0..50 {
            let targets = g.relay_targets(&members[1], &members[2], RELAY_FANOUT, &mut rng);
            assert_eq!(targets.len(), 2);
            assert!(!targets.contains(&members[1]));
            assert!(!targets.contains(&members[2]));
            assert!(!targets.contains(&members[0]));
        }
    }

    #[test]
    fn authored_reaches_full_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let members = keys(5);
        let mut g = GossipOrder::new();
        g.reshuffle(&members, &members[0], &mut rng);
        assert_eq!(g.authored_targets().len(), 4);
    }

    #[test]
    fn relay_in_tiny_network_is_bounded_by_eligible() {
        let mut rng = StdRng::seed_from_u64(4);
        let members = keys(3);
        let mut g = GossipOrder::new();
        g.reshuffle(&members, &members[0], &mut rng);
        let targets = g.relay_targets(&members[1], &members[2], RELAY_FANOUT, &mut rng);
        assert!(targets.is_empty());
    }
}
