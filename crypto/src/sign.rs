//! Ed25519 message signing and verification.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use shroud_types::{PrivateKey, PublicKey, Signature};

/// Sign a message with a private key.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    Signature(signing_key.sign(message).to_bytes())
}

/// Verify `signature` over `message` for `public_key`.
///
/// An undecodable key does not verify. Non-canonical signatures are rejected.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify_strict(message, &dalek_sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_keypair, keypair_from_seed};

    #[test]
    fn sign_and_verify() {
        let kp = generate_keypair();
        let sig = sign_message(b"block hash", &kp.private);
        assert!(verify_signature(b"block hash", &sig, &kp.public));
    }

    #[test]
    fn tampered_message_fails() {
        let kp = generate_keypair();
        let sig = sign_message(b"block hash", &kp.private);
        assert!(!verify_signature(b"block hasH", &sig, &kp.public));
    }

    #[test]
    fn other_key_fails() {
        let signer = keypair_from_seed(&[1u8; 32]);
        let other = keypair_from_seed(&[2u8; 32]);
        let sig = sign_message(b"vote", &signer.private);
        assert!(!verify_signature(b"vote", &sig, &other.public));
    }

    #[test]
    fn undecodable_key_fails() {
        let kp = generate_keypair();
        let sig = sign_message(b"x", &kp.private);
        assert!(!verify_signature(b"x", &sig, &PublicKey([0xFF; 32])));
    }
}
