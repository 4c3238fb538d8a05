//! coinjecture-mempool
//!
//! Bounded pool of verified pending transactions, ordered by priority, with
//! deduplication and aging. Admission checks signature and shape only;
//! nonce/balance validation happens at block-build time so that several
//! pending transactions from one sender can queue behind each other.

pub mod pool;

pub use pool::{spawn_janitor, Mempool, MempoolConfig};
