use thiserror::Error;

/// Unified error type for the COINjecture core.
///
/// Variants are grouped by how callers are expected to react: structural and
/// cryptographic failures penalise the message source, semantic rejections
/// are local and non-fatal, consistency failures reject a whole block, and
/// storage errors propagate to the orchestrator.
#[derive(Debug, Error)]
pub enum CoinjectureError {
    // ── Structural / format ──────────────────────────────────────────────────
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unsupported codec version: {got}")]
    UnsupportedCodec { got: u8 },

    // ── Cryptographic ────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    // ── Semantic rejections ──────────────────────────────────────────────────
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },

    #[error("insufficient balance: need {need} beans, have {have}")]
    InsufficientBalance { need: u64, have: u64 },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("self-transfer not allowed")]
    SelfTransfer,

    #[error("gas limit too low: minimum {min}, got {got}")]
    GasLimitTooLow { min: u64, got: u64 },

    #[error("amount + fee overflows u64")]
    CostOverflow,

    #[error("escrow transaction carries no escrow data")]
    EscrowDataMissing,

    #[error("duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("duplicate block: {0}")]
    DuplicateBlock(u64),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("priority below mempool threshold")]
    BelowPriorityThreshold,

    // ── Consistency failures ─────────────────────────────────────────────────
    #[error("block hash mismatch: header claims {claimed}, computed {computed}")]
    BlockHashMismatch { claimed: String, computed: String },

    #[error("tx root mismatch: header claims {claimed}, computed {computed}")]
    TxRootMismatch { claimed: String, computed: String },

    #[error("state root mismatch: header claims {claimed}, computed {computed}")]
    StateRootMismatch { claimed: String, computed: String },

    #[error("parent hash mismatch: expected {expected}, got {got}")]
    ParentHashMismatch { expected: String, got: String },

    #[error("non-sequential block: expected number {expected}, got {got}")]
    NonSequentialBlock { expected: u64, got: u64 },

    #[error("block timestamp {got} not after parent timestamp {parent}")]
    TimestampNotMonotonic { parent: i64, got: i64 },

    #[error("block timestamp {got} too far in the future (max {max})")]
    TimestampInFuture { max: i64, got: i64 },

    #[error("block gas {used} exceeds limit {limit}")]
    BlockGasExceeded { limit: u64, used: u64 },

    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    // ── Checkpoints ──────────────────────────────────────────────────────────
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("checkpoint is unsigned")]
    UnsignedCheckpoint,

    // ── Resource exhaustion ──────────────────────────────────────────────────
    #[error("mempool full ({capacity} transactions)")]
    MempoolFull { capacity: u32 },

    #[error("broadcast queue full: {0}")]
    BroadcastQueueFull(String),

    #[error("sync range too large: max {max}, requested {got}")]
    SyncRangeTooLarge { max: u64, got: u64 },

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}
