//! coinjecture-state
//!
//! Durable home of the account map and the block archive, plus the
//! checkpoint manager. One exclusive writer, many concurrent readers;
//! block application is atomic down to the storage layer.

pub mod checkpoint;
pub mod db;
pub mod store;

pub use checkpoint::{CheckpointConfig, CheckpointManager};
pub use db::{BlockCommit, ChainDb, ChainState, SchemaMigration, TxRecord, ValidatorRecord, SCHEMA_VERSION};
pub use store::{Executor, StateStore};
