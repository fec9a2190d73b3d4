//! Per-`(type, origin)` sequence guard.
//!
//! Envelopes arrive unordered and duplicated. A message is processed only if
//! its `seq` is strictly greater than the highest recorded for its
//! `(type, origin)` pair; everything else is a replay.

use std::collections::HashMap;

use serde::Serialize;
use shroud_messages::MessageType;
use shroud_types::PublicKey;

/// One row of the gossip introspection view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GossipEntry {
    pub msg_type: MessageType,
    pub origin: PublicKey,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct SequenceGuard {
    last: HashMap<(MessageType, PublicKey), u64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fresh(&self, msg_type: MessageType, origin: &PublicKey, seq: u64) -> bool {
        self.last
            .get(&(msg_type, *origin))
            .map_or(true, |&last| seq > last)
    }

    /// Record `seq` if it is fresh. Returns `false` for replays.
    pub fn accept(&mut self, msg_type: MessageType, origin: &PublicKey, seq: u64) -> bool {
        if !self.is_fresh(msg_type, origin, seq) {
            return false;
        }
        self.last.insert((msg_type, *origin), seq);
        true
    }

    /// Highest recorded sequence per pair, sorted by type then origin.
    pub fn entries(&self) -> Vec<GossipEntry> {
        let mut out: Vec<GossipEntry> = self
            .last
            .iter()
            .map(|(&(msg_type, origin), &seq)| GossipEntry {
                msg_type,
                origin,
                seq,
            })
            .collect();
        out.sort_by(|a, b| (a.msg_type, a.origin).cmp(&(b.msg_type, b.origin)));
        out
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PublicKey = PublicKey([1; 32]);
    const B: PublicKey = PublicKey([2; 32]);

    #[test]
    fn duplicate_and_older_are_replays() {
        let mut g = SequenceGuard::new();
        assert!(g.accept(MessageType::Vote, &A, 10));
        assert!(!g.accept(MessageType::Vote, &A, 10));
        assert!(!g.accept(MessageType::Vote, &A, 9));
        assert!(g.accept(MessageType::Vote, &A, 11));
    }

    #[test]
    fn pairs_are_independent() {
        let mut g = SequenceGuard::new();
        assert!(g.accept(MessageType::Vote, &A, 10));
        assert!(g.accept(MessageType::Commit, &A, 1));
        assert!(g.accept(MessageType::Vote, &B, 1));
        assert_eq!(g.len(), 3);
        assert_eq!(g.entries()[0].msg_type, MessageType::Vote);
    }
}
