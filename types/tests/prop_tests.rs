use proptest::prelude::*;

use shroud_types::{BlockHash, PublicKey, Signature, Timestamp};

proptest! {
    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Display then FromStr reproduces the hash.
    #[test]
    fn block_hash_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let parsed: BlockHash = hash.to_string().parse().unwrap();
        prop_assert_eq!(parsed, hash);
    }

    /// Public keys survive both the binary and the JSON representation.
    #[test]
    fn public_key_serde_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let pk = PublicKey(bytes);
        let bin: PublicKey = bincode::deserialize(&bincode::serialize(&pk).unwrap()).unwrap();
        let json: PublicKey = serde_json::from_str(&serde_json::to_string(&pk).unwrap()).unwrap();
        prop_assert_eq!(bin, pk);
        prop_assert_eq!(json, pk);
    }

    /// Signatures longer than 32 bytes still roundtrip through bincode.
    #[test]
    fn signature_bincode_roundtrip(v in prop::collection::vec(any::<u8>(), 64)) {
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&v);
        let sig = Signature(arr);
        let back: Signature = bincode::deserialize(&bincode::serialize(&sig).unwrap()).unwrap();
        prop_assert_eq!(back, sig);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        prop_assert_eq!(Timestamp::new(a) <= Timestamp::new(b), a <= b);
    }

    /// has_expired agrees with elapsed_since.
    #[test]
    fn timestamp_expiry_consistent(start in 0u64..1_000_000, dur in 0u64..1_000_000, now in 0u64..3_000_000) {
        let ts = Timestamp::new(start);
        let now = Timestamp::new(now);
        prop_assert_eq!(ts.has_expired(dur, now), now.as_millis() >= start + dur);
        if now.as_millis() >= start {
            prop_assert_eq!(ts.elapsed_since(now), now.as_millis() - start);
        }
    }
}
