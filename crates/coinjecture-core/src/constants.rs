//! ─── COINjecture Protocol Constants ─────────────────────────────────────────
//!
//! Consensus-critical limits and the default tuning of the gossip layer.
//! Changing any value in the consensus section is a hard fork.

// ── Codec ────────────────────────────────────────────────────────────────────

/// Canonical encoding version carried in every transaction.
pub const CODEC_VERSION: u8 = 1;

// ── Gas ──────────────────────────────────────────────────────────────────────

/// Minimum gas limit for a value transfer.
pub const TRANSFER_GAS_MIN: u64 = 21_000;

/// Hard cap on `gas_limit` (and therefore `gas_used`) of any valid block.
pub const BLOCK_GAS_HARD_CAP: u64 = 50_000_000;

/// Default per-block gas target when building.
pub const BLOCK_GAS_BUILD_LIMIT: u64 = 30_000_000;

/// Default maximum transaction count per block.
pub const MAX_TX_PER_BLOCK: u32 = 1_000;

// ── Block timing ─────────────────────────────────────────────────────────────

/// A block timestamp may lead wall clock by at most this many seconds.
pub const MAX_FUTURE_DRIFT_SECS: i64 = 15;

/// Default block production interval for validator nodes (seconds).
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 10;

// ── Gossip topics ────────────────────────────────────────────────────────────

pub const TX_TOPIC: &str = "/coinjecture/tx/1.0.0";
pub const BLOCK_TOPIC: &str = "/coinjecture/blocks/1.0.0";
pub const CID_TOPIC: &str = "/coinjecture/cids/1.0.0";
pub const BLOCK_SYNC_PROTOCOL: &str = "/coinjecture/blocksync/1.0.0";

// ── Gossip batching ──────────────────────────────────────────────────────────

/// Flush interval for partial transaction/CID batches (milliseconds).
/// The historical network ran at 14.140 s; it is a tuning knob, nothing more.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 14_140;

/// Maximum transactions per gossip batch.
pub const TX_BATCH_MAX: usize = 100;

/// Maximum content IDs per gossip batch.
pub const CID_BATCH_MAX: usize = 50;

/// Capacity of the outbound tx/CID broadcast queues.
pub const BROADCAST_QUEUE_CAPACITY: usize = 1_000;

/// Timeout for publishing a block to the gossip mesh (seconds).
pub const BLOCK_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Maximum blocks served in a single block-sync response.
pub const BLOCK_SYNC_MAX_BLOCKS: u64 = 128;

// ── Mempool defaults ─────────────────────────────────────────────────────────

pub const MEMPOOL_MAX_SIZE: u32 = 10_000;
pub const MEMPOOL_MAX_TX_AGE_SECS: u64 = 3_600;
pub const MEMPOOL_CLEANUP_INTERVAL_SECS: u64 = 60;

// ── Checkpoints ──────────────────────────────────────────────────────────────

/// Checkpoint every N blocks.
pub const CHECKPOINT_INTERVAL: u64 = 100;

/// Retain at most this many checkpoints (FIFO prune).
pub const MAX_CHECKPOINTS: usize = 10;

// ── Peer scoring ─────────────────────────────────────────────────────────────

pub const PEER_INITIAL_SCORE: i32 = 100;
pub const PEER_QUARANTINE_THRESHOLD: i32 = 10;
pub const PEER_BAN_THRESHOLD: i32 = 0;

pub const SCORE_VALID_MESSAGE: i32 = 1;
pub const SCORE_INVALID_MESSAGE: i32 = -10;
pub const SCORE_TIMEOUT: i32 = -5;
pub const SCORE_MALFORMED: i32 = -20;

/// Scores below the initial value recover by +1 every decay interval.
pub const SCORE_DECAY_INTERVAL_SECS: u64 = 300;

/// Peers silent for this long are evicted from the table.
pub const PEER_STALE_TIMEOUT_SECS: u64 = 300;
