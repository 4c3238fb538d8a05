//! coinjecture-crypto
//!
//! SHA-256 hashing, Ed25519 signatures, and the Merkle engine.
//! All canonical preimages live in `coinjecture-core`; this crate turns them
//! into identifiers and verifies signatures over them.

pub mod ed25519;
pub mod hash;
pub mod keypair;
pub mod merkle;

pub use ed25519::{sign, verify_signature, SignatureError};
pub use hash::{account_leaf_hash, block_hash, sha256, tx_hash};
pub use keypair::KeyPair;
pub use merkle::{build_proof, merkle_root, verify_proof};

use coinjecture_core::error::CoinjectureError;
use coinjecture_core::transaction::Transaction;

/// Verify a transaction's signature over its canonical signing bytes.
pub fn verify_tx_signature(tx: &Transaction) -> Result<(), CoinjectureError> {
    verify_signature(&tx.from, &tx.signing_bytes(), &tx.signature)
        .map_err(|_| CoinjectureError::InvalidSignature)
}

/// Sign a transaction in place with the sender's keypair.
pub fn sign_tx(tx: &mut Transaction, keypair: &KeyPair) {
    tx.signature = keypair.sign(&tx.signing_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinjecture_core::constants::{CODEC_VERSION, TRANSFER_GAS_MIN};
    use coinjecture_core::types::{Address, Signature};
    use coinjecture_core::transaction::TxType;

    fn unsigned_tx(from: Address) -> Transaction {
        Transaction {
            codec_version: CODEC_VERSION,
            tx_type: TxType::Transfer,
            from,
            to: Address::from_bytes([9u8; 32]),
            amount: 100,
            fee: 10,
            gas_limit: TRANSFER_GAS_MIN,
            gas_price: 1,
            nonce: 0,
            data: Vec::new(),
            timestamp: 1_700_000_000,
            signature: Signature::ZERO,
        }
    }

    #[test]
    fn signed_tx_verifies() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx(kp.address);
        sign_tx(&mut tx, &kp);
        assert!(verify_tx_signature(&tx).is_ok());
    }

    #[test]
    fn fee_is_signature_covered() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx(kp.address);
        sign_tx(&mut tx, &kp);
        tx.fee += 1;
        assert!(verify_tx_signature(&tx).is_err());
    }

    #[test]
    fn tx_hash_ignores_signature() {
        let kp = KeyPair::generate();
        let mut tx = unsigned_tx(kp.address);
        let before = tx_hash(&tx);
        sign_tx(&mut tx, &kp);
        assert_eq!(before, tx_hash(&tx));
    }
}
