use std::sync::Arc;

use tracing::debug;

use coinjecture_core::block::{Block, BlockHeader};
use coinjecture_core::constants::{BLOCK_GAS_BUILD_LIMIT, MAX_TX_PER_BLOCK};
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{Address, Gas, Hash32, Timestamp};
use coinjecture_crypto::{merkle_root, tx_hash};
use coinjecture_mempool::Mempool;
use coinjecture_state::{Executor, StateStore};

/// Block assembly knobs. `gas_limit` is the builder's target and must not
/// exceed the protocol hard cap.
#[derive(Debug, Clone)]
pub struct BlockConfig {
    pub max_tx_per_block: u32,
    pub gas_limit: Gas,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            max_tx_per_block: MAX_TX_PER_BLOCK,
            gas_limit: BLOCK_GAS_BUILD_LIMIT,
        }
    }
}

/// Produces the next block from mempool contents.
pub struct BlockBuilder {
    store: Arc<StateStore>,
    mempool: Arc<Mempool>,
    config: BlockConfig,
}

impl BlockBuilder {
    pub fn new(store: Arc<StateStore>, mempool: Arc<Mempool>, config: BlockConfig) -> Self {
        Self {
            store,
            mempool,
            config,
        }
    }

    /// Assemble the next block on top of the current head.
    ///
    /// Candidates come out of the mempool in priority order and are checked
    /// against a projection of the post-block state: wrong nonce or an
    /// overdrawn running balance skips the candidate (it stays pooled),
    /// and a candidate that would push past the gas target is passed over.
    /// Included transactions bump the projected sender nonce so chains of
    /// consecutive nonces from one sender fit in a single block.
    pub fn build_block(&self, validator: Address, now: Timestamp) -> Result<Block, CoinjectureError> {
        let head = self.store.chain_state()?;
        let parent_timestamp = match self.store.get_block_by_number(head.head_block_number)? {
            Some(parent) => parent.header.timestamp,
            None => head.genesis_timestamp,
        };
        let timestamp = now.max(parent_timestamp + 1);

        let store = Arc::clone(&self.store);
        let mut executor = Executor::new(move |a: &Address| store.get_account(a), timestamp);

        let candidates = self.mempool.pop_best(self.mempool.size() as usize);
        let mut included = Vec::new();
        let mut gas_used: Gas = 0;

        for tx in candidates {
            if included.len() >= self.config.max_tx_per_block as usize {
                break;
            }
            if gas_used + tx.gas_limit > self.config.gas_limit {
                continue;
            }
            match executor.apply_tx(&tx) {
                Ok(()) => {
                    gas_used += tx.gas_limit;
                    included.push(tx);
                }
                Err(e) => {
                    debug!(error = %e, "skipping mempool candidate");
                }
            }
        }

        let leaves: Vec<Hash32> = included.iter().map(|tx| tx_hash(tx).0).collect();
        let header = BlockHeader {
            block_number: head.head_block_number + 1,
            parent_hash: head.head_block_hash,
            state_root: executor.state_root(),
            tx_root: merkle_root(&leaves),
            timestamp,
            validator,
            difficulty: 0,
            nonce: 0,
            gas_limit: self.config.gas_limit,
            gas_used,
            extra_data: [0u8; 32],
        };

        Ok(Block {
            header,
            transactions: included,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinjecture_core::constants::{CODEC_VERSION, TRANSFER_GAS_MIN};
    use coinjecture_core::types::Signature;
    use coinjecture_core::{Transaction, TxType};
    use coinjecture_crypto::KeyPair;
    use coinjecture_mempool::MempoolConfig;

    fn setup(tag: &str) -> (Arc<StateStore>, Arc<Mempool>) {
        let dir = std::env::temp_dir().join(format!("cjbuild-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (
            Arc::new(StateStore::open(&dir).unwrap()),
            Arc::new(Mempool::new(MempoolConfig::default())),
        )
    }

    fn transfer(kp: &KeyPair, nonce: u64, amount: u64, fee: u64) -> Transaction {
        let mut tx = Transaction {
            codec_version: CODEC_VERSION,
            tx_type: TxType::Transfer,
            from: kp.address,
            to: Address::from_bytes([9u8; 32]),
            amount,
            fee,
            gas_limit: TRANSFER_GAS_MIN,
            gas_price: 1,
            nonce,
            data: Vec::new(),
            timestamp: 1_700_000_000,
            signature: Signature::ZERO,
        };
        coinjecture_crypto::sign_tx(&mut tx, kp);
        tx
    }

    #[test]
    fn empty_mempool_builds_empty_block() {
        let (store, mempool) = setup("empty");
        let builder = BlockBuilder::new(store, mempool, BlockConfig::default());
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        assert_eq!(block.header.block_number, 1);
        assert!(block.transactions.is_empty());
        assert_eq!(block.header.tx_root, [0u8; 32]);
        assert_eq!(block.header.gas_used, 0);
    }

    #[test]
    fn wrong_nonce_candidate_skipped() {
        let (store, mempool) = setup("nonce");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 1_000, 0).unwrap();
        mempool.add(transfer(&kp, 5, 100, 10)).unwrap();

        let builder = BlockBuilder::new(store, Arc::clone(&mempool), BlockConfig::default());
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        assert!(block.transactions.is_empty());
        // The candidate stays pooled for a later height.
        assert_eq!(mempool.size(), 1);
    }

    #[test]
    fn overdraft_candidate_skipped() {
        let (store, mempool) = setup("balance");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 50, 0).unwrap();
        mempool.add(transfer(&kp, 0, 100, 10)).unwrap();

        let builder = BlockBuilder::new(store, mempool, BlockConfig::default());
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn gas_cap_bounds_inclusion() {
        let (store, mempool) = setup("gas");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 1_000_000, 0).unwrap();
        for nonce in 0..5 {
            mempool.add(transfer(&kp, nonce, 100, 10)).unwrap();
        }

        let builder = BlockBuilder::new(
            store,
            mempool,
            BlockConfig {
                max_tx_per_block: 1_000,
                gas_limit: 50_000,
            },
        );
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        // Two 21k transfers fit under 50k; a third would exceed.
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.header.gas_used, 42_000);
        assert_eq!(block.transactions[0].nonce, 0);
        assert_eq!(block.transactions[1].nonce, 1);
    }

    #[test]
    fn consecutive_nonces_chain_in_one_block() {
        let (store, mempool) = setup("chain");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 1_000, 0).unwrap();
        mempool.add(transfer(&kp, 0, 100, 10)).unwrap();
        mempool.add(transfer(&kp, 1, 100, 10)).unwrap();

        let builder = BlockBuilder::new(store, mempool, BlockConfig::default());
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.header.gas_used, 42_000);
    }

    #[test]
    fn tx_cap_bounds_inclusion() {
        let (store, mempool) = setup("cap");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 1_000_000, 0).unwrap();
        for nonce in 0..4 {
            mempool.add(transfer(&kp, nonce, 100, 10)).unwrap();
        }
        let builder = BlockBuilder::new(
            store,
            mempool,
            BlockConfig {
                max_tx_per_block: 3,
                gas_limit: BLOCK_GAS_BUILD_LIMIT,
            },
        );
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        assert_eq!(block.transactions.len(), 3);
    }
}
