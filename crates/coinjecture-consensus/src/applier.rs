use std::sync::Arc;

use tracing::{info, warn};

use coinjecture_core::block::Block;
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{BlockHash, Timestamp};
use coinjecture_crypto::{block_hash, tx_hash};
use coinjecture_mempool::Mempool;
use coinjecture_state::{CheckpointManager, StateStore};

use crate::validation::validate_structure;

/// Applies blocks — locally built or received over gossip — through the full
/// pipeline: structural validation, atomic state apply, mempool cleanup,
/// checkpoint hook.
pub struct BlockApplier {
    store: Arc<StateStore>,
    mempool: Arc<Mempool>,
    checkpoints: Arc<CheckpointManager>,
}

impl BlockApplier {
    pub fn new(
        store: Arc<StateStore>,
        mempool: Arc<Mempool>,
        checkpoints: Arc<CheckpointManager>,
    ) -> Self {
        Self {
            store,
            mempool,
            checkpoints,
        }
    }

    /// Validate and apply one block. On success the block is archived, its
    /// transactions leave the mempool, and a checkpoint may be created.
    ///
    /// `claimed_hash` is the hash advertised with a gossiped block (None for
    /// locally built blocks, whose hash is derived on the spot).
    pub fn apply_block(
        &self,
        block: &Block,
        claimed_hash: Option<BlockHash>,
        now: Timestamp,
    ) -> Result<BlockHash, CoinjectureError> {
        validate_structure(block, claimed_hash, &self.store, now)?;

        // Atomic: any per-tx failure or state-root mismatch leaves the store
        // exactly as it was.
        self.store.apply_block(block)?;

        for tx in &block.transactions {
            self.mempool.remove(&tx_hash(tx));
        }

        let number = block.header.block_number;
        let stored = self.store.get_block_by_number(number)?.ok_or_else(|| {
            CoinjectureError::Storage(format!("block {number} vanished after apply"))
        })?;
        let chain = self.store.chain_state()?;
        if let Err(e) = self.checkpoints.on_block(&stored, chain.total_transactions) {
            warn!(error = %e, number, "checkpoint creation failed");
        }

        let hash = block_hash(&block.header);
        info!(number, hash = %hash, txs = block.transactions.len(), "block accepted");
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinjecture_core::types::Address;
    use coinjecture_crypto::KeyPair;
    use coinjecture_mempool::MempoolConfig;
    use coinjecture_state::CheckpointConfig;

    use crate::builder::{BlockBuilder, BlockConfig};

    fn setup(tag: &str) -> (Arc<StateStore>, Arc<Mempool>, Arc<CheckpointManager>) {
        let dir = std::env::temp_dir().join(format!("cjapply-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        (
            Arc::new(StateStore::open(&dir).unwrap()),
            Arc::new(Mempool::new(MempoolConfig::default())),
            Arc::new(CheckpointManager::new(
                CheckpointConfig {
                    interval: 2,
                    max_checkpoints: 4,
                },
                Some(Arc::new(KeyPair::generate())),
            )),
        )
    }

    #[test]
    fn built_blocks_apply_cleanly() {
        let (store, mempool, checkpoints) = setup("clean");
        let builder = BlockBuilder::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            BlockConfig::default(),
        );
        let applier = BlockApplier::new(store.clone(), mempool, checkpoints);

        let validator = Address::from_bytes([1u8; 32]);
        let block = builder.build_block(validator, 1_000).unwrap();
        applier.apply_block(&block, None, 1_000).unwrap();
        assert_eq!(store.chain_state().unwrap().head_block_number, 1);
    }

    #[test]
    fn applied_block_clears_mempool_entries() {
        let (store, mempool, checkpoints) = setup("drain");
        let kp = KeyPair::generate();
        store.create_account(kp.address, 1_000, 0).unwrap();

        let mut tx = coinjecture_core::Transaction {
            codec_version: coinjecture_core::constants::CODEC_VERSION,
            tx_type: coinjecture_core::TxType::Transfer,
            from: kp.address,
            to: Address::from_bytes([9u8; 32]),
            amount: 100,
            fee: 10,
            gas_limit: coinjecture_core::constants::TRANSFER_GAS_MIN,
            gas_price: 1,
            nonce: 0,
            data: Vec::new(),
            timestamp: 500,
            signature: coinjecture_core::types::Signature::ZERO,
        };
        coinjecture_crypto::sign_tx(&mut tx, &kp);
        let hash = mempool.add(tx).unwrap();

        let builder = BlockBuilder::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            BlockConfig::default(),
        );
        let applier = BlockApplier::new(store, Arc::clone(&mempool), checkpoints);
        let block = builder.build_block(Address::from_bytes([1u8; 32]), 1_000).unwrap();
        assert_eq!(block.transactions.len(), 1);
        applier.apply_block(&block, None, 1_000).unwrap();
        assert!(!mempool.contains(&hash));
    }

    #[test]
    fn checkpoint_fires_on_interval_heights() {
        let (store, mempool, checkpoints) = setup("cp");
        let builder = BlockBuilder::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            BlockConfig::default(),
        );
        let applier = BlockApplier::new(store, mempool, Arc::clone(&checkpoints));

        let validator = Address::from_bytes([1u8; 32]);
        for i in 0..4u64 {
            let block = builder.build_block(validator, 1_000 + i as i64).unwrap();
            applier
                .apply_block(&block, None, 1_000 + i as i64)
                .unwrap();
        }
        let listed = checkpoints.list().unwrap();
        assert_eq!(
            listed.iter().map(|c| c.block_number).collect::<Vec<_>>(),
            vec![2, 4]
        );
    }

    #[test]
    fn tampered_gossip_hash_rejected() {
        let (store, mempool, checkpoints) = setup("hash");
        let builder = BlockBuilder::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            BlockConfig::default(),
        );
        let applier = BlockApplier::new(store, mempool, checkpoints);
        let block = builder
            .build_block(Address::from_bytes([1u8; 32]), 1_000)
            .unwrap();
        let bogus = BlockHash::from_bytes([0xff; 32]);
        assert!(matches!(
            applier.apply_block(&block, Some(bogus), 1_000),
            Err(CoinjectureError::BlockHashMismatch { .. })
        ));
    }
}
