use sha2::{Digest, Sha256};

use coinjecture_core::block::BlockHeader;
use coinjecture_core::transaction::Transaction;
use coinjecture_core::types::{Address, BlockHash, Hash32, TxHash};

/// Compute SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive a transaction identifier from its canonical hash preimage.
pub fn tx_hash(tx: &Transaction) -> TxHash {
    TxHash::from_bytes(sha256(&tx.hash_bytes()))
}

/// Derive a block identifier from the header preimage.
pub fn block_hash(header: &BlockHeader) -> BlockHash {
    BlockHash::from_bytes(sha256(&header.hash_preimage()))
}

/// Leaf hash for the state root: SHA-256(address ‖ balance ‖ nonce),
/// integers little-endian.
pub fn account_leaf_hash(address: &Address, balance: u64, nonce: u64) -> Hash32 {
    let mut buf = [0u8; 32 + 8 + 8];
    buf[..32].copy_from_slice(address.as_bytes());
    buf[32..40].copy_from_slice(&balance.to_le_bytes());
    buf[40..].copy_from_slice(&nonce.to_le_bytes());
    sha256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn account_leaf_hash_is_field_sensitive() {
        let addr = Address::from_bytes([1u8; 32]);
        let base = account_leaf_hash(&addr, 100, 0);
        assert_ne!(base, account_leaf_hash(&addr, 101, 0));
        assert_ne!(base, account_leaf_hash(&addr, 100, 1));
        assert_ne!(base, account_leaf_hash(&Address::from_bytes([2u8; 32]), 100, 0));
    }
}
