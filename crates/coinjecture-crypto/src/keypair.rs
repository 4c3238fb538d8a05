use std::fs;
use std::io;
use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use coinjecture_core::types::{Address, Signature};

use crate::ed25519;

/// A node keypair: Ed25519 seed plus the derived public-key address.
///
/// The seed is wiped from memory on drop.
pub struct KeyPair {
    pub address: Address,
    seed: [u8; 32],
}

impl KeyPair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let sk = SigningKey::generate(&mut OsRng);
        Self {
            address: Address::from_bytes(sk.verifying_key().to_bytes()),
            seed: sk.to_bytes(),
        }
    }

    /// Restore a keypair from a raw 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let sk = SigningKey::from_bytes(&seed);
        Self {
            address: Address::from_bytes(sk.verifying_key().to_bytes()),
            seed,
        }
    }

    /// Load the hex-encoded seed from `path`, or generate one and persist it
    /// on first start.
    pub fn load_or_generate<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let mut text = fs::read_to_string(path)?;
            let trimmed = text.trim();
            let bytes = hex::decode(trimmed)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            text.zeroize();
            if bytes.len() != 32 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("key file {}: expected 32 bytes, got {}", path.display(), bytes.len()),
                ));
            }
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(Self::from_seed(seed))
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let kp = Self::generate();
            fs::write(path, hex::encode(kp.seed))?;
            Ok(kp)
        }
    }

    /// Sign `message` with this keypair's seed.
    pub fn sign(&self, message: &[u8]) -> Signature {
        ed25519::sign(&self.seed, message)
    }

    /// Return a copy of the raw seed (libp2p identity construction).
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.seed
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ address: {:?} }}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_or_generate_persists() {
        let dir = std::env::temp_dir().join(format!("cjkey-{}", std::process::id()));
        let path = dir.join("node.key");
        let first = KeyPair::load_or_generate(&path).unwrap();
        let second = KeyPair::load_or_generate(&path).unwrap();
        assert_eq!(first.address, second.address);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn signatures_verify_against_address() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(ed25519::verify_signature(&kp.address, b"hello", &sig).is_ok());
    }
}
