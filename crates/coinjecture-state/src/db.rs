use std::path::Path;

use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::Transactional;

use coinjecture_core::account::Account;
use coinjecture_core::block::StoredBlock;
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{Address, BlockHash, Timestamp, TxHash};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

const CHAIN_STATE_KEY: &str = "chain_state";
const SCHEMA_VERSION_KEY: &str = "schema_version";

// ── Row types ────────────────────────────────────────────────────────────────

/// Append-only transaction archive row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub from_address: Address,
    pub to_address: Address,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub gas_used: u64,
    pub timestamp: Timestamp,
}

/// Registered block producer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub address: Address,
    pub active: bool,
    pub blocks_produced: u64,
    pub last_block_number: u64,
    pub last_block_timestamp: Timestamp,
    pub registered_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Single-row head pointer, updated on every applied block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainState {
    pub head_block_number: u64,
    pub head_block_hash: BlockHash,
    pub genesis_hash: BlockHash,
    pub genesis_timestamp: Timestamp,
    pub block_time_seconds: u64,
    pub validator_count: u64,
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub updated_at: Timestamp,
}

impl ChainState {
    /// The pre-genesis head: height 0, all-zero hash.
    pub fn fresh() -> Self {
        Self {
            head_block_number: 0,
            head_block_hash: BlockHash::ZERO,
            genesis_hash: BlockHash::ZERO,
            genesis_timestamp: 0,
            block_time_seconds: coinjecture_core::constants::DEFAULT_BLOCK_TIME_SECS,
            validator_count: 0,
            total_blocks: 0,
            total_transactions: 0,
            updated_at: 0,
        }
    }
}

/// Migration ledger entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchemaMigration {
    pub version: u32,
    pub applied_at: Timestamp,
    pub description: String,
}

/// Everything a single block apply writes, staged for one atomic commit.
pub struct BlockCommit {
    pub accounts: Vec<Account>,
    pub stored_block: StoredBlock,
    pub tx_records: Vec<TxRecord>,
    pub validator: Option<ValidatorRecord>,
    pub chain_state: ChainState,
}

// ── ChainDb ──────────────────────────────────────────────────────────────────

/// Persistent chain database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   accounts     — address bytes      → bincode(Account)
///   blocks       — block_number (be)  → bincode(StoredBlock)
///   block_hashes — block_hash bytes   → block_number (be)
///   transactions — tx_hash bytes      → bincode(TxRecord)
///   validators   — address bytes      → bincode(ValidatorRecord)
///   meta         — utf8 key bytes     → bincode rows (head pointer, schema)
///
/// Archived blocks and transaction records are append-only: no method on
/// this type updates or deletes them.
pub struct ChainDb {
    db: sled::Db,
    accounts: sled::Tree,
    blocks: sled::Tree,
    block_hashes: sled::Tree,
    transactions: sled::Tree,
    validators: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> CoinjectureError {
    CoinjectureError::Storage(e.to_string())
}

fn codec_err(e: impl std::fmt::Display) -> CoinjectureError {
    CoinjectureError::Serialization(e.to_string())
}

impl ChainDb {
    /// Open or create the chain database at `path` and run schema migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoinjectureError> {
        let db = sled::open(path).map_err(storage_err)?;
        let accounts = db.open_tree("accounts").map_err(storage_err)?;
        let blocks = db.open_tree("blocks").map_err(storage_err)?;
        let block_hashes = db.open_tree("block_hashes").map_err(storage_err)?;
        let transactions = db.open_tree("transactions").map_err(storage_err)?;
        let validators = db.open_tree("validators").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        let this = Self {
            db,
            accounts,
            blocks,
            block_hashes,
            transactions,
            validators,
            meta,
        };
        this.migrate()?;
        Ok(this)
    }

    /// Bring the schema ledger up to `SCHEMA_VERSION`; refuse downgrades.
    fn migrate(&self) -> Result<(), CoinjectureError> {
        let mut ledger: Vec<SchemaMigration> = match self.meta.get(SCHEMA_VERSION_KEY).map_err(storage_err)? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(codec_err)?,
            None => Vec::new(),
        };
        let current = ledger.last().map(|m| m.version).unwrap_or(0);
        if current > SCHEMA_VERSION {
            return Err(CoinjectureError::Storage(format!(
                "database schema version {current} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        if current < SCHEMA_VERSION {
            ledger.push(SchemaMigration {
                version: SCHEMA_VERSION,
                applied_at: 0,
                description: "initial schema".into(),
            });
            let bytes = bincode::serialize(&ledger).map_err(codec_err)?;
            self.meta.insert(SCHEMA_VERSION_KEY, bytes).map_err(storage_err)?;
        }
        Ok(())
    }

    pub fn schema_migrations(&self) -> Result<Vec<SchemaMigration>, CoinjectureError> {
        match self.meta.get(SCHEMA_VERSION_KEY).map_err(storage_err)? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(codec_err),
            None => Ok(Vec::new()),
        }
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub fn get_account(&self, addr: &Address) -> Result<Option<Account>, CoinjectureError> {
        match self.accounts.get(addr.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_account(&self, account: &Account) -> Result<(), CoinjectureError> {
        let bytes = bincode::serialize(account).map_err(codec_err)?;
        self.accounts
            .insert(account.address.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn account_exists(&self, addr: &Address) -> bool {
        self.accounts.contains_key(addr.as_bytes()).unwrap_or(false)
    }

    pub fn count_accounts(&self) -> u64 {
        self.accounts.len() as u64
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    pub fn get_block(&self, number: u64) -> Result<Option<StoredBlock>, CoinjectureError> {
        match self.blocks.get(number.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, CoinjectureError> {
        match self.block_hashes.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                self.get_block(u64::from_be_bytes(arr))
            }
            None => Ok(None),
        }
    }

    pub fn block_exists(&self, number: u64) -> bool {
        self.blocks.contains_key(number.to_be_bytes()).unwrap_or(false)
    }

    pub fn count_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Archive a block outside the apply path (genesis import, tests).
    /// Rejects duplicate block numbers; archived rows are never overwritten.
    pub fn put_block(&self, block: &StoredBlock) -> Result<(), CoinjectureError> {
        if self.block_exists(block.header.block_number) {
            return Err(CoinjectureError::DuplicateBlock(block.header.block_number));
        }
        let bytes = bincode::serialize(block).map_err(codec_err)?;
        self.blocks
            .insert(block.header.block_number.to_be_bytes(), bytes)
            .map_err(storage_err)?;
        self.block_hashes
            .insert(
                block.block_hash.as_bytes(),
                &block.header.block_number.to_be_bytes(),
            )
            .map_err(storage_err)?;
        Ok(())
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub fn tx_exists(&self, hash: &TxHash) -> bool {
        self.transactions.contains_key(hash.as_bytes()).unwrap_or(false)
    }

    pub fn get_tx_record(&self, hash: &TxHash) -> Result<Option<TxRecord>, CoinjectureError> {
        match self.transactions.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn count_transactions(&self) -> u64 {
        self.transactions.len() as u64
    }

    // ── Validators ───────────────────────────────────────────────────────────

    pub fn get_validator(&self, addr: &Address) -> Result<Option<ValidatorRecord>, CoinjectureError> {
        match self.validators.get(addr.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_validator(&self, v: &ValidatorRecord) -> Result<(), CoinjectureError> {
        let bytes = bincode::serialize(v).map_err(codec_err)?;
        self.validators
            .insert(v.address.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn count_validators(&self) -> u64 {
        self.validators.len() as u64
    }

    pub fn iter_validators(&self) -> Result<Vec<ValidatorRecord>, CoinjectureError> {
        let mut out = Vec::new();
        for item in self.validators.iter() {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(codec_err)?);
        }
        Ok(out)
    }

    // ── Chain state ──────────────────────────────────────────────────────────

    pub fn chain_state(&self) -> Result<ChainState, CoinjectureError> {
        match self.meta.get(CHAIN_STATE_KEY).map_err(storage_err)? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(codec_err),
            None => Ok(ChainState::fresh()),
        }
    }

    pub fn put_chain_state(&self, state: &ChainState) -> Result<(), CoinjectureError> {
        let bytes = bincode::serialize(state).map_err(codec_err)?;
        self.meta.insert(CHAIN_STATE_KEY, bytes).map_err(storage_err)?;
        Ok(())
    }

    // ── Atomic block commit ──────────────────────────────────────────────────

    /// Write everything a block apply produces in one sled transaction:
    /// account states, the archive row, the hash index, per-tx records, the
    /// producing validator, and the head pointer. All or nothing — a crash
    /// mid-commit recovers to the previous head.
    pub fn commit_block(&self, commit: &BlockCommit) -> Result<(), CoinjectureError> {
        let number_key = commit.stored_block.header.block_number.to_be_bytes();
        let block_bytes = bincode::serialize(&commit.stored_block).map_err(codec_err)?;
        let state_bytes = bincode::serialize(&commit.chain_state).map_err(codec_err)?;
        let account_rows: Vec<(Vec<u8>, Vec<u8>)> = commit
            .accounts
            .iter()
            .map(|a| Ok((a.address.as_bytes().to_vec(), bincode::serialize(a).map_err(codec_err)?)))
            .collect::<Result<_, CoinjectureError>>()?;
        let tx_rows: Vec<(Vec<u8>, Vec<u8>)> = commit
            .tx_records
            .iter()
            .map(|r| Ok((r.tx_hash.as_bytes().to_vec(), bincode::serialize(r).map_err(codec_err)?)))
            .collect::<Result<_, CoinjectureError>>()?;
        let validator_row = match &commit.validator {
            Some(v) => Some((v.address.as_bytes().to_vec(), bincode::serialize(v).map_err(codec_err)?)),
            None => None,
        };

        (
            &self.accounts,
            &self.blocks,
            &self.block_hashes,
            &self.transactions,
            &self.validators,
            &self.meta,
        )
            .transaction(
                |(accounts, blocks, block_hashes, transactions, validators, meta)| {
                    for (key, value) in &account_rows {
                        accounts.insert(key.as_slice(), value.as_slice())?;
                    }
                    blocks.insert(&number_key, block_bytes.as_slice())?;
                    block_hashes.insert(commit.stored_block.block_hash.as_bytes(), &number_key)?;
                    for (key, value) in &tx_rows {
                        transactions.insert(key.as_slice(), value.as_slice())?;
                    }
                    if let Some((key, value)) = &validator_row {
                        validators.insert(key.as_slice(), value.as_slice())?;
                    }
                    meta.insert(CHAIN_STATE_KEY, state_bytes.as_slice())?;
                    Ok::<(), ConflictableTransactionError<()>>(())
                },
            )
            .map_err(|e| CoinjectureError::Storage(format!("block commit failed: {e:?}")))?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), CoinjectureError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}
