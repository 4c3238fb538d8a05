use serde::{Deserialize, Serialize};

use crate::types::{Address, Balance, Nonce, Timestamp};

/// Full on-chain account state as stored in the state DB.
///
/// Accounts are created on first credit (or explicit creation) and never
/// destroyed. `nonce` counts transactions sent from this account and is
/// monotonically non-decreasing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: Balance,
    pub nonce: Nonce,
    /// Unix timestamp of the block (or genesis) that created this account.
    pub created_at: Timestamp,
}

impl Account {
    /// Create a new account with the given starting balance.
    pub fn new(address: Address, balance: Balance, created_at: Timestamp) -> Self {
        Self {
            address,
            balance,
            nonce: 0,
            created_at,
        }
    }
}
