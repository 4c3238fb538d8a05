use serde::{Deserialize, Serialize};

use coinjecture_core::constants::DEFAULT_BLOCK_TIME_SECS;
use coinjecture_core::types::{Address, Balance, Timestamp};

/// One pre-funded genesis account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Balance,
}

/// Parameters for bootstrapping a fresh chain, supplied as a JSON file on
/// first start and identical on every node of the network.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Unix timestamp the chain starts from; block 1 must be after it.
    pub genesis_timestamp: Timestamp,
    /// Target block production interval (seconds).
    #[serde(default = "default_block_time")]
    pub block_time_seconds: u64,
    /// Accounts funded at genesis.
    #[serde(default)]
    pub initial_accounts: Vec<GenesisAccount>,
    /// The permissioned validator set.
    #[serde(default)]
    pub validators: Vec<Address>,
}

fn default_block_time() -> u64 {
    DEFAULT_BLOCK_TIME_SECS
}

impl GenesisParams {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
