//! coinjecture-consensus
//!
//! Block production and admission: candidate selection under gas and
//! validator rules, structural validation of received blocks, and the
//! apply pipeline that ties the state store, mempool, and checkpoint
//! manager together.

pub mod applier;
pub mod builder;
pub mod validation;

pub use applier::BlockApplier;
pub use builder::{BlockBuilder, BlockConfig};
pub use validation::validate_structure;
