//! coinjecture-genesis
//!
//! Seeds a fresh chain database: initial account balances, the validator
//! set, and the chain-state row. Applied exactly once, directly against the
//! store — genesis balances have no transactions and no signatures; they are
//! the founding document every node agrees on out-of-band.
//!
//! The virtual genesis block has height 0 and an all-zero hash, so the first
//! produced block is number 1 with a zero parent hash. The genesis
//! identifier stored in `chain_state` fingerprints the parameter file.

pub mod params;

pub use params::{GenesisAccount, GenesisParams};

use tracing::info;

use coinjecture_core::account::Account;
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::BlockHash;
use coinjecture_crypto::sha256;
use coinjecture_state::{ChainState, StateStore};

/// Apply genesis to an empty store. Fails if the chain already started.
pub fn apply_genesis(store: &StateStore, params: &GenesisParams) -> Result<BlockHash, CoinjectureError> {
    let chain = store.chain_state()?;
    if chain.head_block_number != 0 || chain.genesis_timestamp != 0 {
        return Err(CoinjectureError::Other(
            "genesis already applied to this database".into(),
        ));
    }

    info!(
        accounts = params.initial_accounts.len(),
        validators = params.validators.len(),
        "applying genesis state"
    );

    for entry in &params.initial_accounts {
        store.seed_account(&Account::new(
            entry.address,
            entry.balance,
            params.genesis_timestamp,
        ))?;
        info!(account = %entry.address, balance = entry.balance, "genesis: funded account");
    }

    for validator in &params.validators {
        store.register_validator(*validator, params.genesis_timestamp)?;
        info!(validator = %validator, "genesis: registered validator");
    }

    // Fingerprint of the parameter file; nodes bootstrapped from different
    // parameters will disagree here immediately rather than at block 1.
    let encoded = serde_json::to_vec(params)
        .map_err(|e| CoinjectureError::Serialization(e.to_string()))?;
    let genesis_hash = BlockHash::from_bytes(sha256(&encoded));

    store.init_chain_state(&ChainState {
        head_block_number: 0,
        head_block_hash: BlockHash::ZERO,
        genesis_hash,
        genesis_timestamp: params.genesis_timestamp,
        block_time_seconds: params.block_time_seconds,
        validator_count: params.validators.len() as u64,
        total_blocks: 0,
        total_transactions: 0,
        updated_at: params.genesis_timestamp,
    })?;

    info!(genesis = %genesis_hash, "genesis complete");
    Ok(genesis_hash)
}
