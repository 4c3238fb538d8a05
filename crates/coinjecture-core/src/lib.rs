pub mod account;
pub mod block;
pub mod checkpoint;
pub mod constants;
pub mod error;
pub mod transaction;
pub mod types;

pub use account::Account;
pub use block::{Block, BlockHeader, StoredBlock};
pub use checkpoint::Checkpoint;
pub use constants::*;
pub use error::CoinjectureError;
pub use transaction::{Transaction, TxType};
pub use types::*;
