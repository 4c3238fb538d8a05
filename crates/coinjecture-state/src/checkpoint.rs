use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use coinjecture_core::block::StoredBlock;
use coinjecture_core::checkpoint::Checkpoint;
use coinjecture_core::constants::{CHECKPOINT_INTERVAL, MAX_CHECKPOINTS};
use coinjecture_core::error::CoinjectureError;
use coinjecture_crypto::{verify_signature, KeyPair};

/// Checkpoint policy knobs.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Snapshot every N blocks.
    pub interval: u64,
    /// FIFO retention cap.
    pub max_checkpoints: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: CHECKPOINT_INTERVAL,
            max_checkpoints: MAX_CHECKPOINTS,
        }
    }
}

/// Periodic signed state snapshots enabling fast-sync for new nodes.
///
/// The table is in-memory; checkpoints are cheap to re-derive from the
/// archive and the set is bounded by `max_checkpoints`.
pub struct CheckpointManager {
    config: CheckpointConfig,
    signer: Option<Arc<KeyPair>>,
    table: Mutex<BTreeMap<u64, Checkpoint>>,
}

fn lock_err() -> CoinjectureError {
    CoinjectureError::Storage("checkpoint table lock poisoned".into())
}

impl CheckpointManager {
    /// `signer` is the validator key; without one, created checkpoints stay
    /// unsigned and will not verify (development mode only).
    pub fn new(config: CheckpointConfig, signer: Option<Arc<KeyPair>>) -> Self {
        Self {
            config,
            signer,
            table: Mutex::new(BTreeMap::new()),
        }
    }

    /// Called after every applied block; creates a checkpoint at interval
    /// heights. `total_tx_count` is the cumulative chain transaction count.
    pub fn on_block(
        &self,
        block: &StoredBlock,
        total_tx_count: u64,
    ) -> Result<Option<Checkpoint>, CoinjectureError> {
        let number = block.header.block_number;
        if number == 0 || number % self.config.interval != 0 {
            return Ok(None);
        }
        let cp = self.create(block, total_tx_count)?;
        Ok(Some(cp))
    }

    /// Build, sign, insert, and FIFO-prune.
    pub fn create(
        &self,
        block: &StoredBlock,
        total_tx_count: u64,
    ) -> Result<Checkpoint, CoinjectureError> {
        let mut cp = Checkpoint {
            block_number: block.header.block_number,
            block_hash: block.block_hash,
            state_root: block.header.state_root,
            timestamp: block.header.timestamp,
            tx_count: total_tx_count,
            validator_key: None,
            signature: None,
        };
        match &self.signer {
            Some(kp) => {
                cp.validator_key = Some(kp.address);
                cp.signature = Some(kp.sign(&cp.signing_bytes()));
            }
            None => {
                warn!(
                    number = cp.block_number,
                    "no validator key configured; checkpoint left unsigned"
                );
            }
        }

        let mut table = self.table.lock().map_err(|_| lock_err())?;
        table.insert(cp.block_number, cp.clone());
        while table.len() > self.config.max_checkpoints {
            let oldest = *table.keys().next().expect("non-empty table");
            table.remove(&oldest);
        }
        info!(number = cp.block_number, hash = %cp.block_hash, "checkpoint created");
        Ok(cp)
    }

    pub fn get(&self, number: u64) -> Result<Option<Checkpoint>, CoinjectureError> {
        Ok(self.table.lock().map_err(|_| lock_err())?.get(&number).cloned())
    }

    pub fn get_latest(&self) -> Result<Option<Checkpoint>, CoinjectureError> {
        Ok(self
            .table
            .lock()
            .map_err(|_| lock_err())?
            .values()
            .next_back()
            .cloned())
    }

    /// Highest checkpoint at or below `number`.
    pub fn get_at_or_before(&self, number: u64) -> Result<Option<Checkpoint>, CoinjectureError> {
        Ok(self
            .table
            .lock()
            .map_err(|_| lock_err())?
            .range(..=number)
            .next_back()
            .map(|(_, cp)| cp.clone()))
    }

    /// All retained checkpoints, ascending by height.
    pub fn list(&self) -> Result<Vec<Checkpoint>, CoinjectureError> {
        Ok(self.table.lock().map_err(|_| lock_err())?.values().cloned().collect())
    }

    /// JSON export for out-of-band distribution.
    pub fn export(&self, number: u64) -> Result<Vec<u8>, CoinjectureError> {
        let cp = self
            .get(number)?
            .ok_or_else(|| CoinjectureError::InvalidCheckpoint(format!("no checkpoint at {number}")))?;
        serde_json::to_vec(&cp).map_err(|e| CoinjectureError::Serialization(e.to_string()))
    }

    /// Import a JSON checkpoint; verified before insertion.
    pub fn import(&self, bytes: &[u8]) -> Result<Checkpoint, CoinjectureError> {
        let cp: Checkpoint = serde_json::from_slice(bytes)
            .map_err(|e| CoinjectureError::Malformed(format!("checkpoint JSON: {e}")))?;
        if !self.verify(&cp) {
            return Err(CoinjectureError::InvalidCheckpoint(format!(
                "checkpoint {} failed verification",
                cp.block_number
            )));
        }
        let mut table = self.table.lock().map_err(|_| lock_err())?;
        table.insert(cp.block_number, cp.clone());
        while table.len() > self.config.max_checkpoints {
            let oldest = *table.keys().next().expect("non-empty table");
            table.remove(&oldest);
        }
        Ok(cp)
    }

    /// A checkpoint is valid iff it is well-formed AND carries a signature
    /// that verifies under its validator key. Unsigned checkpoints are
    /// rejected unconditionally.
    pub fn verify(&self, cp: &Checkpoint) -> bool {
        if !cp.is_well_formed() {
            return false;
        }
        match (&cp.validator_key, &cp.signature) {
            (Some(key), Some(sig)) => verify_signature(key, &cp.signing_bytes(), sig).is_ok(),
            _ => false,
        }
    }

    /// Fast-sync entry point: the best trusted starting point for a node that
    /// wants to reach `target`, plus the first block it must fetch.
    pub fn sync_from(&self, target: u64) -> Result<(Option<Checkpoint>, u64), CoinjectureError> {
        match self.get_at_or_before(target)? {
            Some(cp) => {
                let next = cp.block_number + 1;
                Ok((Some(cp), next))
            }
            None => Ok((None, 1)),
        }
    }

    pub fn clear(&self) -> Result<(), CoinjectureError> {
        self.table.lock().map_err(|_| lock_err())?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinjecture_core::block::BlockHeader;
    use coinjecture_core::types::{Address, BlockHash};

    fn stored_block(number: u64) -> StoredBlock {
        StoredBlock {
            header: BlockHeader {
                block_number: number,
                parent_hash: BlockHash::ZERO,
                state_root: [3u8; 32],
                tx_root: [0u8; 32],
                timestamp: 1_000 + number as i64,
                validator: Address::from_bytes([1u8; 32]),
                difficulty: 0,
                nonce: 0,
                gas_limit: 30_000_000,
                gas_used: 0,
                extra_data: [0u8; 32],
            },
            block_hash: BlockHash::from_bytes([number as u8; 32]),
            tx_count: 0,
            tx_data: Vec::new(),
            created_at: 0,
        }
    }

    fn signed_manager(interval: u64, cap: usize) -> CheckpointManager {
        CheckpointManager::new(
            CheckpointConfig {
                interval,
                max_checkpoints: cap,
            },
            Some(Arc::new(KeyPair::generate())),
        )
    }

    #[test]
    fn checkpoints_only_at_interval_heights() {
        let mgr = signed_manager(100, 10);
        assert!(mgr.on_block(&stored_block(99), 10).unwrap().is_none());
        assert!(mgr.on_block(&stored_block(100), 10).unwrap().is_some());
        assert!(mgr.on_block(&stored_block(101), 10).unwrap().is_none());
    }

    #[test]
    fn signed_checkpoints_verify() {
        let mgr = signed_manager(100, 10);
        let cp = mgr.on_block(&stored_block(100), 42).unwrap().unwrap();
        assert!(mgr.verify(&cp));
        assert_eq!(cp.tx_count, 42);
    }

    #[test]
    fn unsigned_checkpoints_rejected() {
        let unsigned = CheckpointManager::new(CheckpointConfig::default(), None);
        let cp = unsigned.on_block(&stored_block(100), 0).unwrap().unwrap();
        assert!(!unsigned.verify(&cp));
    }

    #[test]
    fn tampered_checkpoint_fails_verification() {
        let mgr = signed_manager(100, 10);
        let mut cp = mgr.on_block(&stored_block(100), 0).unwrap().unwrap();
        cp.state_root = [9u8; 32];
        assert!(!mgr.verify(&cp));
    }

    #[test]
    fn fifo_prune_keeps_newest() {
        let mgr = signed_manager(100, 2);
        for n in [100, 200, 300] {
            mgr.on_block(&stored_block(n), 0).unwrap();
        }
        let listed = mgr.list().unwrap();
        assert_eq!(
            listed.iter().map(|c| c.block_number).collect::<Vec<_>>(),
            vec![200, 300]
        );
    }

    #[test]
    fn sync_from_returns_checkpoint_and_next_block() {
        let mgr = signed_manager(100, 10);
        mgr.on_block(&stored_block(100), 0).unwrap();
        let (cp, next) = mgr.sync_from(250).unwrap();
        assert_eq!(cp.unwrap().block_number, 100);
        assert_eq!(next, 101);

        let (none, next) = mgr.sync_from(50).unwrap();
        assert!(none.is_none());
        assert_eq!(next, 1);
    }

    #[test]
    fn export_import_round_trip() {
        let mgr = signed_manager(100, 10);
        mgr.on_block(&stored_block(100), 7).unwrap();
        let bytes = mgr.export(100).unwrap();

        let other = signed_manager(100, 10);
        let imported = other.import(&bytes).unwrap();
        assert_eq!(imported.block_number, 100);
        assert_eq!(other.get(100).unwrap().unwrap().tx_count, 7);
    }

    #[test]
    fn import_rejects_unsigned() {
        let unsigned = CheckpointManager::new(CheckpointConfig::default(), None);
        let cp = unsigned.on_block(&stored_block(100), 0).unwrap().unwrap();
        let bytes = serde_json::to_vec(&cp).unwrap();
        let mgr = signed_manager(100, 10);
        assert!(mgr.import(&bytes).is_err());
    }

    #[test]
    fn clear_empties_table() {
        let mgr = signed_manager(100, 10);
        mgr.on_block(&stored_block(100), 0).unwrap();
        mgr.clear().unwrap();
        assert!(mgr.get_latest().unwrap().is_none());
    }
}
