#![no_main]

use libfuzzer_sys::fuzz_target;

// Blocks arrive as JSON over the HTTP API and as bincode inside envelopes.
// Neither path, nor the structural checks after it, may panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(block) = serde_json::from_slice::<shroud_ledger::Block>(data) {
        let _ = block.check();
        let _ = block.compute_hash();
    }
    if let Ok(block) = bincode::deserialize::<shroud_ledger::Block>(data) {
        let _ = block.check();
        let _ = block.votes_bytes();
    }
    if let Ok(tx) = bincode::deserialize::<shroud_ledger::Transaction>(data) {
        let _ = tx.check();
    }
    let _ = bincode::deserialize::<shroud_types::BlockHash>(data);
    let _ = bincode::deserialize::<shroud_types::Signature>(data);
});
