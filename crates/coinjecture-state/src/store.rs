use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use tracing::{debug, info};

use coinjecture_core::account::Account;
use coinjecture_core::block::{Block, StoredBlock};
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{Address, Balance, BlockHash, Hash32, Timestamp, TxHash};
use coinjecture_core::{Transaction, TxType};
use coinjecture_crypto::{account_leaf_hash, merkle_root, tx_hash};

use crate::db::{BlockCommit, ChainDb, ChainState, TxRecord, ValidatorRecord};

// ── Executor ─────────────────────────────────────────────────────────────────

/// Deterministic transaction executor over an account overlay.
///
/// Reads fall through to the supplied fetch closure; mutations stay in the
/// overlay until the caller commits them. Each `apply_tx` is atomic: on any
/// rejection the overlay is untouched. The same executor drives both block
/// building (projection) and block application.
pub struct Executor<F>
where
    F: FnMut(&Address) -> Result<Option<Account>, CoinjectureError>,
{
    fetch: F,
    overlay: BTreeMap<Address, Account>,
    created_at: Timestamp,
}

impl<F> Executor<F>
where
    F: FnMut(&Address) -> Result<Option<Account>, CoinjectureError>,
{
    /// `created_at` stamps accounts first credited by this body.
    pub fn new(fetch: F, created_at: Timestamp) -> Self {
        Self {
            fetch,
            overlay: BTreeMap::new(),
            created_at,
        }
    }

    fn account(&mut self, addr: &Address) -> Result<Option<Account>, CoinjectureError> {
        if let Some(acc) = self.overlay.get(addr) {
            return Ok(Some(acc.clone()));
        }
        (self.fetch)(addr)
    }

    /// Expected nonce for `addr`, counting overlay mutations.
    pub fn expected_nonce(&mut self, addr: &Address) -> Result<u64, CoinjectureError> {
        Ok(self.account(addr)?.map(|a| a.nonce).unwrap_or(0))
    }

    /// Apply one transaction in body order:
    /// nonce check, balance check, debit `amount + fee` (fee burned),
    /// credit recipient (created at zero balance if absent), bump nonce.
    pub fn apply_tx(&mut self, tx: &Transaction) -> Result<(), CoinjectureError> {
        let mut sender = self
            .account(&tx.from)?
            .ok_or_else(|| CoinjectureError::UnknownAccount(tx.from.to_string()))?;

        if tx.nonce != sender.nonce {
            return Err(CoinjectureError::InvalidNonce {
                expected: sender.nonce,
                got: tx.nonce,
            });
        }

        let cost = tx.total_cost()?;
        if sender.balance < cost {
            return Err(CoinjectureError::InsufficientBalance {
                need: cost,
                have: sender.balance,
            });
        }

        let mut recipient = match self.account(&tx.to)? {
            Some(acc) => acc,
            None => Account::new(tx.to, 0, self.created_at),
        };

        // Every variant settles the same way on the ledger; escrow terms in
        // `data` are opaque to the core.
        match tx.tx_type {
            TxType::Transfer | TxType::Escrow => {
                sender.balance -= cost;
                recipient.balance += tx.amount;
            }
        }
        sender.nonce += 1;

        self.overlay.insert(tx.from, sender);
        self.overlay.insert(tx.to, recipient);
        Ok(())
    }

    /// Merkle root over SHA-256(address ‖ balance ‖ nonce) of every touched
    /// account, ascending by address. Empty body → all-zero root.
    pub fn state_root(&self) -> Hash32 {
        let leaves: Vec<Hash32> = self
            .overlay
            .values()
            .map(|a| account_leaf_hash(&a.address, a.balance, a.nonce))
            .collect();
        merkle_root(&leaves)
    }

    /// Consume the executor and return the touched accounts, ascending.
    pub fn into_touched(self) -> Vec<Account> {
        self.overlay.into_values().collect()
    }
}

// ── StateStore ───────────────────────────────────────────────────────────────

/// Reader-writer facade over the chain database.
///
/// Writers (`apply_block`, `create_account`, `save_block`, genesis seeding)
/// are exclusive; queries take shared read guards and never block block
/// production for longer than a lookup.
pub struct StateStore {
    inner: RwLock<ChainDb>,
}

fn lock_err() -> CoinjectureError {
    CoinjectureError::Storage("state store lock poisoned".into())
}

impl StateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoinjectureError> {
        let db = ChainDb::open(path)?;
        Ok(Self {
            inner: RwLock::new(db),
        })
    }

    // ── Queries (shared lock) ────────────────────────────────────────────────

    pub fn get_account(&self, addr: &Address) -> Result<Option<Account>, CoinjectureError> {
        self.inner.read().map_err(|_| lock_err())?.get_account(addr)
    }

    pub fn chain_state(&self) -> Result<ChainState, CoinjectureError> {
        self.inner.read().map_err(|_| lock_err())?.chain_state()
    }

    pub fn get_block_by_number(&self, number: u64) -> Result<Option<StoredBlock>, CoinjectureError> {
        self.inner.read().map_err(|_| lock_err())?.get_block(number)
    }

    pub fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Option<StoredBlock>, CoinjectureError> {
        self.inner.read().map_err(|_| lock_err())?.get_block_by_hash(hash)
    }

    pub fn get_latest_block(&self) -> Result<Option<StoredBlock>, CoinjectureError> {
        let db = self.inner.read().map_err(|_| lock_err())?;
        let head = db.chain_state()?.head_block_number;
        db.get_block(head)
    }

    /// Inclusive range query, clamped to the archive.
    pub fn get_block_range(&self, start: u64, end: u64) -> Result<Vec<StoredBlock>, CoinjectureError> {
        let db = self.inner.read().map_err(|_| lock_err())?;
        let mut out = Vec::new();
        for number in start..=end {
            match db.get_block(number)? {
                Some(b) => out.push(b),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn get_block_count(&self) -> Result<u64, CoinjectureError> {
        Ok(self.inner.read().map_err(|_| lock_err())?.count_blocks())
    }

    pub fn contains_tx(&self, hash: &TxHash) -> Result<bool, CoinjectureError> {
        Ok(self.inner.read().map_err(|_| lock_err())?.tx_exists(hash))
    }

    pub fn get_validator(&self, addr: &Address) -> Result<Option<ValidatorRecord>, CoinjectureError> {
        self.inner.read().map_err(|_| lock_err())?.get_validator(addr)
    }

    pub fn validator_count(&self) -> Result<u64, CoinjectureError> {
        Ok(self.inner.read().map_err(|_| lock_err())?.count_validators())
    }

    // ── Mutations (exclusive lock) ───────────────────────────────────────────

    /// Explicit account creation. Fails if the address already exists.
    pub fn create_account(
        &self,
        addr: Address,
        initial_balance: Balance,
        now: Timestamp,
    ) -> Result<(), CoinjectureError> {
        let db = self.inner.write().map_err(|_| lock_err())?;
        if db.account_exists(&addr) {
            return Err(CoinjectureError::AccountExists(addr.to_string()));
        }
        db.put_account(&Account::new(addr, initial_balance, now))
    }

    /// Genesis seeding: upsert without the existence check.
    pub fn seed_account(&self, account: &Account) -> Result<(), CoinjectureError> {
        self.inner.write().map_err(|_| lock_err())?.put_account(account)
    }

    /// Register a block producer (genesis or governance action).
    pub fn register_validator(&self, addr: Address, now: Timestamp) -> Result<(), CoinjectureError> {
        let db = self.inner.write().map_err(|_| lock_err())?;
        db.put_validator(&ValidatorRecord {
            address: addr,
            active: true,
            blocks_produced: 0,
            last_block_number: 0,
            last_block_timestamp: 0,
            registered_at: now,
            updated_at: now,
        })?;
        let mut state = db.chain_state()?;
        state.validator_count = db.count_validators();
        db.put_chain_state(&state)
    }

    /// Overwrite the head-pointer row (genesis bootstrap only).
    pub fn init_chain_state(&self, state: &ChainState) -> Result<(), CoinjectureError> {
        self.inner.write().map_err(|_| lock_err())?.put_chain_state(state)
    }

    /// Archive a block without applying its body (fast-sync backfill below a
    /// trusted checkpoint). Rejects duplicates.
    pub fn save_block(&self, block: &StoredBlock) -> Result<(), CoinjectureError> {
        self.inner.write().map_err(|_| lock_err())?.put_block(block)
    }

    /// Apply a block atomically: all of the body's transactions mutate
    /// accounts, or none do and the block is not archived.
    ///
    /// Verifies chain linkage, at-most-once inclusion, per-transaction
    /// semantics, and that the recomputed state root matches the header.
    /// Returns the state root on success.
    pub fn apply_block(&self, block: &Block) -> Result<Hash32, CoinjectureError> {
        let db = self.inner.write().map_err(|_| lock_err())?;
        let head = db.chain_state()?;

        let number = block.header.block_number;
        if db.block_exists(number) {
            return Err(CoinjectureError::DuplicateBlock(number));
        }
        let expected = head.head_block_number + 1;
        if number != expected {
            return Err(CoinjectureError::NonSequentialBlock {
                expected,
                got: number,
            });
        }
        if block.header.parent_hash != head.head_block_hash {
            return Err(CoinjectureError::ParentHashMismatch {
                expected: head.head_block_hash.to_hex(),
                got: block.header.parent_hash.to_hex(),
            });
        }

        // At-most-once inclusion across the whole archive.
        let hashes: Vec<TxHash> = block.transactions.iter().map(tx_hash).collect();
        for hash in &hashes {
            if db.tx_exists(hash) {
                return Err(CoinjectureError::DuplicateTransaction(hash.to_hex()));
            }
        }

        // Execute the body in order against an overlay; any per-tx failure
        // rejects the whole block with state untouched.
        let mut executor = Executor::new(|a: &Address| db.get_account(a), block.header.timestamp);
        for tx in &block.transactions {
            executor.apply_tx(tx)?;
        }
        let root = executor.state_root();
        if root != block.header.state_root {
            return Err(CoinjectureError::StateRootMismatch {
                claimed: hex::encode(block.header.state_root),
                computed: hex::encode(root),
            });
        }

        let block_hash = coinjecture_crypto::block_hash(&block.header);
        let tx_records: Vec<TxRecord> = block
            .transactions
            .iter()
            .zip(&hashes)
            .map(|(tx, hash)| TxRecord {
                tx_hash: *hash,
                block_number: number,
                from_address: tx.from,
                to_address: tx.to,
                amount: tx.amount,
                fee: tx.fee,
                nonce: tx.nonce,
                gas_used: tx.gas_limit,
                timestamp: tx.timestamp,
            })
            .collect();

        let validator = {
            let mut record = db.get_validator(&block.header.validator)?.unwrap_or(ValidatorRecord {
                address: block.header.validator,
                active: true,
                blocks_produced: 0,
                last_block_number: 0,
                last_block_timestamp: 0,
                registered_at: block.header.timestamp,
                updated_at: block.header.timestamp,
            });
            record.blocks_produced += 1;
            record.last_block_number = number;
            record.last_block_timestamp = block.header.timestamp;
            record.updated_at = block.header.timestamp;
            record
        };
        let validator_is_new = db.get_validator(&block.header.validator)?.is_none();

        let chain_state = ChainState {
            head_block_number: number,
            head_block_hash: block_hash,
            genesis_hash: head.genesis_hash,
            genesis_timestamp: head.genesis_timestamp,
            block_time_seconds: head.block_time_seconds,
            validator_count: head.validator_count + u64::from(validator_is_new),
            total_blocks: head.total_blocks + 1,
            total_transactions: head.total_transactions + block.transactions.len() as u64,
            updated_at: block.header.timestamp,
        };

        let stored_block = StoredBlock {
            header: block.header.clone(),
            block_hash,
            tx_count: block.transactions.len() as u32,
            tx_data: bincode::serialize(&block.transactions)
                .map_err(|e| CoinjectureError::Serialization(e.to_string()))?,
            created_at: block.header.timestamp,
        };

        db.commit_block(&BlockCommit {
            accounts: executor.into_touched(),
            stored_block,
            tx_records,
            validator: Some(validator),
            chain_state,
        })?;

        info!(
            number,
            hash = %block_hash,
            txs = block.transactions.len(),
            gas = block.header.gas_used,
            "applied block"
        );
        Ok(root)
    }

    /// Flush and release. Queries after close still work (sled keeps the
    /// handle alive) but the node treats this as terminal.
    pub fn close(&self) -> Result<(), CoinjectureError> {
        debug!("flushing state store");
        self.inner.read().map_err(|_| lock_err())?.flush()
    }
}
