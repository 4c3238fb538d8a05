use serde::{Deserialize, Serialize};

use crate::types::{hexbytes, Address, BlockHash, Hash32, Signature, Timestamp};

/// A signed state snapshot used as a trusted fast-sync starting point.
///
/// Created only at heights that are multiples of the configured interval.
/// Unsigned checkpoints are rejected in production.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub block_number: u64,
    pub block_hash: BlockHash,
    #[serde(with = "hexbytes")]
    pub state_root: Hash32,
    pub timestamp: Timestamp,
    /// Cumulative transaction count at this height.
    pub tx_count: u64,
    /// Public key of the signing validator.
    pub validator_key: Option<Address>,
    pub signature: Option<Signature>,
}

impl Checkpoint {
    /// The bytes covered by the validator signature: little-endian
    /// concatenation of all content fields.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 32 + 32 + 8 + 8);
        out.extend_from_slice(&self.block_number.to_le_bytes());
        out.extend_from_slice(self.block_hash.as_bytes());
        out.extend_from_slice(&self.state_root);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.tx_count.to_le_bytes());
        out
    }

    /// Structural sanity: non-zero height, timestamp, and block hash.
    /// Signature verification happens in the checkpoint manager, which has
    /// the crypto layer at hand.
    pub fn is_well_formed(&self) -> bool {
        self.block_number != 0 && self.timestamp != 0 && !self.block_hash.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_fields() {
        let mut cp = Checkpoint {
            block_number: 100,
            block_hash: BlockHash::from_bytes([1u8; 32]),
            state_root: [2u8; 32],
            timestamp: 1_700_000_000,
            tx_count: 42,
            validator_key: None,
            signature: None,
        };
        assert!(cp.is_well_formed());
        cp.block_number = 0;
        assert!(!cp.is_well_formed());
        cp.block_number = 100;
        cp.timestamp = 0;
        assert!(!cp.is_well_formed());
        cp.timestamp = 1;
        cp.block_hash = BlockHash::ZERO;
        assert!(!cp.is_well_formed());
    }
}
