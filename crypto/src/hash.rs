//! Blake2b-256 hashing.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Hash multiple byte slices in sequence without concatenating them.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(blake2b_256(b"shroud"), blake2b_256(b"shroud"));
        assert_ne!(blake2b_256(b"shroud"), blake2b_256(b"shroud!"));
    }

    #[test]
    fn multi_equals_concatenation() {
        let single = blake2b_256(b"blockvotes");
        let multi = blake2b_256_multi(&[b"block", b"votes"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn empty_input_is_not_zero() {
        assert_ne!(blake2b_256(b""), [0u8; 32]);
    }
}
