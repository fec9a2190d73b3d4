//! Passive catch-up.
//!
//! A ping carries the sender's height. When the local chain is ahead by at
//! least the sync threshold, the receiver answers with the blocks the
//! sender is missing, at most `sync_size` of them per ping.

use std::ops::RangeInclusive;

use shroud_ledger::Block;
use shroud_store::PeerDirectory;

/// Heights a peer at `peer_height` is missing, bounded by `sync_size`.
pub fn catch_up_range(
    peer_height: u64,
    local_height: u64,
    threshold: u64,
    sync_size: u64,
) -> Option<RangeInclusive<u64>> {
    if local_height <= peer_height || local_height - peer_height < threshold.max(1) || sync_size == 0 {
        return None;
    }
    let from = peer_height + 1;
    let to = local_height.min(peer_height.saturating_add(sync_size));
    Some(from..=to)
}

/// The blocks to push to a peer at `peer_height`.
pub fn catch_up_blocks(
    directory: &dyn PeerDirectory,
    peer_height: u64,
    threshold: u64,
    sync_size: u64,
) -> Vec<Block> {
    match catch_up_range(peer_height, directory.height(), threshold, sync_size) {
        Some(range) => {
            let count = range.end() - range.start() + 1;
            directory.block_range(*range.start(), count)
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_when_peer_is_level_or_ahead() {
        assert_eq!(catch_up_range(5, 5, 1, 10), None);
        assert_eq!(catch_up_range(6, 5, 1, 10), None);
    }

    #[test]
    fn bounded_by_sync_size() {
        assert_eq!(catch_up_range(0, 25, 1, 10), Some(1..=10));
        assert_eq!(catch_up_range(20, 25, 1, 10), Some(21..=25));
    }

    #[test]
    fn respects_threshold() {
        assert_eq!(catch_up_range(3, 5, 3, 10), None);
        assert_eq!(catch_up_range(2, 5, 3, 10), Some(3..=5));
    }
}
