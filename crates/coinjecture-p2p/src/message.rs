//! JSON wire formats for the three gossip topics and the block-sync stream.
//!
//! Field names are snake_case; fixed-size byte fields are hex strings. The
//! canonical hashing preimages are defined in `coinjecture-core` — wire
//! messages carry the sender's claimed hashes so receivers can cross-check.

use serde::{Deserialize, Serialize};

use coinjecture_core::block::{Block, BlockHeader};
use coinjecture_core::constants::BLOCK_SYNC_MAX_BLOCKS;
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{hexbytes, Address, BlockHash, Hash32, Signature, TxHash};
use coinjecture_core::{Transaction, TxType};

// ── Transactions ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxMessage {
    pub codec_version: u8,
    pub tx_type: u8,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub nonce: u64,
    /// Hex-encoded opaque payload.
    pub data: String,
    pub timestamp: i64,
    pub signature: Signature,
    /// Sender's claimed transaction hash.
    pub hash: TxHash,
}

impl TxMessage {
    pub fn from_tx(tx: &Transaction, hash: TxHash) -> Self {
        Self {
            codec_version: tx.codec_version,
            tx_type: tx.tx_type.as_u8(),
            from: tx.from,
            to: tx.to,
            amount: tx.amount,
            fee: tx.fee,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
            nonce: tx.nonce,
            data: hex::encode(&tx.data),
            timestamp: tx.timestamp,
            signature: tx.signature,
            hash,
        }
    }

    /// Decode into a transaction plus the claimed hash. Structural problems
    /// (unknown type tag, bad hex) are malformed-message errors.
    pub fn to_tx(&self) -> Result<(Transaction, TxHash), CoinjectureError> {
        let tx_type = TxType::from_u8(self.tx_type)
            .ok_or_else(|| CoinjectureError::Malformed(format!("unknown tx_type {}", self.tx_type)))?;
        let data = hex::decode(&self.data)
            .map_err(|e| CoinjectureError::Malformed(format!("tx data hex: {e}")))?;
        Ok((
            Transaction {
                codec_version: self.codec_version,
                tx_type,
                from: self.from,
                to: self.to,
                amount: self.amount,
                fee: self.fee,
                gas_limit: self.gas_limit,
                gas_price: self.gas_price,
                nonce: self.nonce,
                data,
                timestamp: self.timestamp,
                signature: self.signature,
            },
            self.hash,
        ))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("tx message serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoinjectureError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoinjectureError::Malformed(format!("tx message JSON: {e}")))
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockMessage {
    pub block_number: u64,
    /// Sender's claimed block hash.
    pub block_hash: BlockHash,
    pub parent_hash: BlockHash,
    #[serde(with = "hexbytes")]
    pub state_root: Hash32,
    #[serde(with = "hexbytes")]
    pub tx_root: Hash32,
    pub timestamp: i64,
    pub validator: Address,
    pub difficulty: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    #[serde(with = "hexbytes")]
    pub extra_data: Hash32,
    pub transactions: Vec<TxMessage>,
}

impl BlockMessage {
    pub fn from_block(block: &Block, block_hash: BlockHash, tx_hashes: &[TxHash]) -> Self {
        Self {
            block_number: block.header.block_number,
            block_hash,
            parent_hash: block.header.parent_hash,
            state_root: block.header.state_root,
            tx_root: block.header.tx_root,
            timestamp: block.header.timestamp,
            validator: block.header.validator,
            difficulty: block.header.difficulty,
            nonce: block.header.nonce,
            gas_limit: block.header.gas_limit,
            gas_used: block.header.gas_used,
            extra_data: block.header.extra_data,
            transactions: block
                .transactions
                .iter()
                .zip(tx_hashes)
                .map(|(tx, hash)| TxMessage::from_tx(tx, *hash))
                .collect(),
        }
    }

    /// Decode into a block plus the claimed hash.
    pub fn to_block(&self) -> Result<(Block, BlockHash), CoinjectureError> {
        let mut transactions = Vec::with_capacity(self.transactions.len());
        for msg in &self.transactions {
            let (tx, _) = msg.to_tx()?;
            transactions.push(tx);
        }
        Ok((
            Block {
                header: BlockHeader {
                    block_number: self.block_number,
                    parent_hash: self.parent_hash,
                    state_root: self.state_root,
                    tx_root: self.tx_root,
                    timestamp: self.timestamp,
                    validator: self.validator,
                    difficulty: self.difficulty,
                    nonce: self.nonce,
                    gas_limit: self.gas_limit,
                    gas_used: self.gas_used,
                    extra_data: self.extra_data,
                },
                transactions,
            },
            self.block_hash,
        ))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("block message serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoinjectureError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoinjectureError::Malformed(format!("block message JSON: {e}")))
    }
}

// ── Content identifiers ──────────────────────────────────────────────────────

/// What kind of off-chain artifact a content ID points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CidType {
    Problem,
    Solution,
    Block,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidMetadata {
    pub size: u64,
    /// Hex-encoded hash of the underlying problem, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_hash: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Advertisement of an off-chain payload by content identifier. The payload
/// itself is retrieved out-of-band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidMessage {
    pub cid: String,
    #[serde(rename = "type")]
    pub cid_type: CidType,
    pub block_number: u64,
    pub timestamp: i64,
    /// Peer ID string of the original publisher.
    pub publisher: String,
    pub metadata: CidMetadata,
}

impl CidMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("cid message serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoinjectureError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoinjectureError::Malformed(format!("cid message JSON: {e}")))
    }
}

// ── Block sync ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockSyncRequest {
    pub from_block: u64,
    pub to_block: u64,
    pub max_blocks: u64,
}

impl BlockSyncRequest {
    /// Validate the range and return the clamped inclusive upper bound.
    pub fn clamped_end(&self) -> Result<u64, CoinjectureError> {
        if self.to_block < self.from_block {
            return Err(CoinjectureError::Malformed(format!(
                "sync range [{}, {}] is inverted",
                self.from_block, self.to_block
            )));
        }
        let span = self.to_block - self.from_block + 1;
        let cap = self.max_blocks.clamp(1, BLOCK_SYNC_MAX_BLOCKS);
        if span > cap {
            return Ok(self.from_block + cap - 1);
        }
        Ok(self.to_block)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockSyncResponse {
    pub blocks: Vec<BlockMessage>,
}
