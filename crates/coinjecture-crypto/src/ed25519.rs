use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use thiserror::Error;

use coinjecture_core::types::{Address, Signature};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Sign `message` with a raw Ed25519 secret key (32-byte seed).
pub fn sign(secret_key_bytes: &[u8; 32], message: &[u8]) -> Signature {
    let sk = SigningKey::from_bytes(secret_key_bytes);
    Signature::from_bytes(sk.sign(message).to_bytes())
}

/// Verify a detached Ed25519 signature. The address IS the public key.
pub fn verify_signature(
    address: &Address,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let pk = VerifyingKey::from_bytes(address.as_bytes())
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    pk.verify(message, &sig)
        .map_err(|_| SignatureError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_round_trip() {
        let sk = SigningKey::generate(&mut OsRng);
        let addr = Address::from_bytes(sk.verifying_key().to_bytes());
        let message = b"sequencing transactions into blocks";

        let sig = sign(&sk.to_bytes(), message);
        assert!(verify_signature(&addr, message, &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails() {
        let sk = SigningKey::generate(&mut OsRng);
        let addr = Address::from_bytes(sk.verifying_key().to_bytes());
        let sig = sign(&sk.to_bytes(), b"original");
        assert!(verify_signature(&addr, b"tampered", &sig).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let sk = SigningKey::generate(&mut OsRng);
        let other = SigningKey::generate(&mut OsRng);
        let addr = Address::from_bytes(other.verifying_key().to_bytes());
        let sig = sign(&sk.to_bytes(), b"message");
        assert!(verify_signature(&addr, b"message", &sig).is_err());
    }
}
