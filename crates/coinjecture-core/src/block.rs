use serde::{Deserialize, Serialize};

use crate::transaction::Transaction;
use crate::types::{hexbytes, Address, BlockHash, Gas, Hash32, Timestamp};

// ── BlockHeader ──────────────────────────────────────────────────────────────

/// Consensus-critical block header.
///
/// The block hash is SHA-256 over [`BlockHeader::hash_preimage`]: the
/// little-endian concatenation of the fields in exactly this declaration
/// order. Reordering a field is a hard fork.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub block_number: u64,
    pub parent_hash: BlockHash,
    #[serde(with = "hexbytes")]
    pub state_root: Hash32,
    #[serde(with = "hexbytes")]
    pub tx_root: Hash32,
    pub timestamp: Timestamp,
    pub validator: Address,
    pub difficulty: u64,
    pub nonce: u64,
    pub gas_limit: Gas,
    pub gas_used: Gas,
    /// Opaque 32 bytes, preserved bit-exactly, never interpreted.
    #[serde(with = "hexbytes")]
    pub extra_data: Hash32,
}

impl BlockHeader {
    /// Canonical hash preimage: little-endian field concatenation in
    /// declaration order.
    pub fn hash_preimage(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * 5 + 32 * 4 + 8);
        out.extend_from_slice(&self.block_number.to_le_bytes());
        out.extend_from_slice(self.parent_hash.as_bytes());
        out.extend_from_slice(&self.state_root);
        out.extend_from_slice(&self.tx_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(self.validator.as_bytes());
        out.extend_from_slice(&self.difficulty.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(&self.gas_used.to_le_bytes());
        out.extend_from_slice(&self.extra_data);
        out
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

/// A block: header plus the ordered transaction body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Sum of the body's gas limits (what `gas_used` must equal).
    pub fn gas_total(&self) -> Gas {
        self.transactions.iter().map(|tx| tx.gas_limit).sum()
    }
}

// ── StoredBlock ──────────────────────────────────────────────────────────────

/// Archive row: the header, its derived hash, and the serialized body.
///
/// Blocks are immutable once archived; there is no update or delete path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredBlock {
    pub header: BlockHeader,
    pub block_hash: BlockHash,
    pub tx_count: u32,
    /// bincode-serialized `Vec<Transaction>`.
    pub tx_data: Vec<u8>,
    pub created_at: Timestamp,
}

impl StoredBlock {
    /// Reassemble the full block from the archived body payload.
    pub fn to_block(&self) -> Result<Block, crate::error::CoinjectureError> {
        let transactions: Vec<Transaction> = bincode::deserialize(&self.tx_data)
            .map_err(|e| crate::error::CoinjectureError::Serialization(e.to_string()))?;
        Ok(Block {
            header: self.header.clone(),
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            block_number: 1,
            parent_hash: BlockHash::ZERO,
            state_root: [0u8; 32],
            tx_root: [0u8; 32],
            timestamp: 1_700_000_000,
            validator: Address::from_bytes([1u8; 32]),
            difficulty: 0,
            nonce: 0,
            gas_limit: 30_000_000,
            gas_used: 0,
            extra_data: [0u8; 32],
        }
    }

    #[test]
    fn preimage_has_fixed_layout() {
        let preimage = sample_header().hash_preimage();
        assert_eq!(preimage.len(), 8 * 5 + 32 * 4 + 8);
        // block_number sits at the front, little-endian.
        assert_eq!(&preimage[..8], &1u64.to_le_bytes());
    }

    #[test]
    fn preimage_changes_with_every_field() {
        let base = sample_header().hash_preimage();
        let mut h = sample_header();
        h.extra_data = [7u8; 32];
        assert_ne!(base, h.hash_preimage());
        let mut h = sample_header();
        h.gas_used = 21_000;
        assert_ne!(base, h.hash_preimage());
    }

    #[test]
    fn stored_block_round_trip() {
        let block = Block {
            header: sample_header(),
            transactions: Vec::new(),
        };
        let stored = StoredBlock {
            header: block.header.clone(),
            block_hash: BlockHash::from_bytes([3u8; 32]),
            tx_count: 0,
            tx_data: bincode::serialize(&block.transactions).unwrap(),
            created_at: 0,
        };
        assert_eq!(stored.to_block().unwrap(), block);
    }
}
