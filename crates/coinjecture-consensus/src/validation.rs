use coinjecture_core::block::Block;
use coinjecture_core::constants::{BLOCK_GAS_HARD_CAP, MAX_FUTURE_DRIFT_SECS};
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{BlockHash, Hash32, Timestamp};
use coinjecture_crypto::{block_hash, merkle_root, tx_hash, verify_tx_signature};
use coinjecture_state::StateStore;

/// Structural validation of a block against the current head.
///
/// Covers every header invariant that can be checked without executing the
/// body: linkage, timestamps, gas bounds, the transaction root, per-tx shape
/// and signatures, and (when a registry exists) validator membership.
/// The state root is verified during the atomic apply.
///
/// `claimed_hash` is the hash the sender advertised; it must match the
/// recomputation from header bytes.
pub fn validate_structure(
    block: &Block,
    claimed_hash: Option<BlockHash>,
    store: &StateStore,
    now: Timestamp,
) -> Result<(), CoinjectureError> {
    let header = &block.header;
    let head = store.chain_state()?;

    let expected = head.head_block_number + 1;
    if header.block_number != expected {
        return Err(CoinjectureError::NonSequentialBlock {
            expected,
            got: header.block_number,
        });
    }
    if header.parent_hash != head.head_block_hash {
        return Err(CoinjectureError::ParentHashMismatch {
            expected: head.head_block_hash.to_hex(),
            got: header.parent_hash.to_hex(),
        });
    }

    let parent_timestamp = match store.get_block_by_number(head.head_block_number)? {
        Some(parent) => parent.header.timestamp,
        None => head.genesis_timestamp,
    };
    if header.timestamp <= parent_timestamp {
        return Err(CoinjectureError::TimestampNotMonotonic {
            parent: parent_timestamp,
            got: header.timestamp,
        });
    }
    let max = now + MAX_FUTURE_DRIFT_SECS;
    if header.timestamp > max {
        return Err(CoinjectureError::TimestampInFuture {
            max,
            got: header.timestamp,
        });
    }

    if header.gas_limit > BLOCK_GAS_HARD_CAP {
        return Err(CoinjectureError::BlockGasExceeded {
            limit: BLOCK_GAS_HARD_CAP,
            used: header.gas_limit,
        });
    }
    if header.gas_used > header.gas_limit {
        return Err(CoinjectureError::BlockGasExceeded {
            limit: header.gas_limit,
            used: header.gas_used,
        });
    }
    let body_gas = block.gas_total();
    if header.gas_used != body_gas {
        return Err(CoinjectureError::BlockGasExceeded {
            limit: header.gas_used,
            used: body_gas,
        });
    }

    if let Some(claimed) = claimed_hash {
        let computed = block_hash(header);
        if claimed != computed {
            return Err(CoinjectureError::BlockHashMismatch {
                claimed: claimed.to_hex(),
                computed: computed.to_hex(),
            });
        }
    }

    let leaves: Vec<Hash32> = block.transactions.iter().map(|tx| tx_hash(tx).0).collect();
    let computed_root = merkle_root(&leaves);
    if header.tx_root != computed_root {
        return Err(CoinjectureError::TxRootMismatch {
            claimed: hex::encode(header.tx_root),
            computed: hex::encode(computed_root),
        });
    }

    for tx in &block.transactions {
        tx.validate_shape()?;
        verify_tx_signature(tx)?;
    }

    // A permissioned chain with a populated registry only accepts blocks
    // from active validators; an empty registry (dev setup) accepts any.
    if store.validator_count()? > 0 {
        match store.get_validator(&header.validator)? {
            Some(v) if v.active => {}
            _ => {
                return Err(CoinjectureError::UnknownValidator(
                    header.validator.to_string(),
                ));
            }
        }
    }

    Ok(())
}
