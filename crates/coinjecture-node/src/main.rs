//! coinjecture-node — the COINjecture full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the chain database
//!   2. Apply genesis if the database is fresh
//!   3. Load the node identity and optional validator key
//!   4. Start the P2P stack (GossipSub + Kademlia + block-sync)
//!   5. Run the gossip loops, and block production on validator nodes

mod node;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use coinjecture_consensus::BlockConfig;
use coinjecture_core::constants::{
    BLOCK_GAS_BUILD_LIMIT, BLOCK_PUBLISH_TIMEOUT_SECS, CHECKPOINT_INTERVAL, CID_BATCH_MAX,
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_BLOCK_TIME_SECS, MAX_CHECKPOINTS, MAX_TX_PER_BLOCK,
    MEMPOOL_CLEANUP_INTERVAL_SECS, MEMPOOL_MAX_SIZE, MEMPOOL_MAX_TX_AGE_SECS,
    PEER_BAN_THRESHOLD, PEER_QUARANTINE_THRESHOLD, PEER_STALE_TIMEOUT_SECS,
    SCORE_DECAY_INTERVAL_SECS, TX_BATCH_MAX,
};
use coinjecture_crypto::KeyPair;
use coinjecture_genesis::GenesisParams;
use coinjecture_mempool::MempoolConfig;
use coinjecture_p2p::{GossipConfig, P2pConfig, ScoringConfig};
use coinjecture_state::{CheckpointConfig, StateStore};

use node::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(
    name = "coinjecture-node",
    version,
    about = "COINjecture full node — sequencing, state, and gossip"
)]
struct Args {
    /// Directory for the persistent chain database and keys.
    #[arg(long, default_value = "~/.coinjecture/data")]
    data_dir: PathBuf,

    /// P2P TCP listen port.
    #[arg(long, default_value_t = 7000)]
    listen_port: u16,

    /// Also listen on QUIC at the same port.
    #[arg(long, default_value_t = false)]
    quic: bool,

    /// Bootstrap peer multiaddresses (comma-separated).
    #[arg(long, value_delimiter = ',')]
    bootstrap: Vec<String>,

    /// Connection watermark: disconnect beyond this many peers.
    #[arg(long, default_value_t = 50)]
    max_peers: usize,

    /// Produce blocks (requires --validator-key-path or a key on disk).
    #[arg(long, default_value_t = false)]
    validator: bool,

    /// Path to the validator signing key (hex seed). Defaults to
    /// <data-dir>/validator.key when --validator is set.
    #[arg(long)]
    validator_key_path: Option<PathBuf>,

    /// Path to genesis params JSON (required on first run of a network).
    #[arg(long)]
    genesis_params: Option<PathBuf>,

    /// Block production interval in seconds.
    #[arg(long, default_value_t = DEFAULT_BLOCK_TIME_SECS)]
    block_time_secs: u64,

    // ── Mempool ──────────────────────────────────────────────────────────────
    #[arg(long, default_value_t = MEMPOOL_MAX_SIZE)]
    mempool_max_size: u32,

    #[arg(long, default_value_t = MEMPOOL_MAX_TX_AGE_SECS)]
    mempool_max_tx_age_secs: u64,

    #[arg(long, default_value_t = MEMPOOL_CLEANUP_INTERVAL_SECS)]
    mempool_cleanup_interval_secs: u64,

    // ── Block building ───────────────────────────────────────────────────────
    #[arg(long, default_value_t = MAX_TX_PER_BLOCK)]
    max_tx_per_block: u32,

    #[arg(long, default_value_t = BLOCK_GAS_BUILD_LIMIT)]
    block_gas_limit: u64,

    // ── Checkpoints ──────────────────────────────────────────────────────────
    #[arg(long, default_value_t = CHECKPOINT_INTERVAL)]
    checkpoint_interval: u64,

    #[arg(long, default_value_t = MAX_CHECKPOINTS)]
    max_checkpoints: usize,

    // ── Peer scoring ─────────────────────────────────────────────────────────
    #[arg(long, default_value_t = PEER_QUARANTINE_THRESHOLD)]
    quarantine_threshold: i32,

    #[arg(long, default_value_t = PEER_BAN_THRESHOLD)]
    ban_threshold: i32,

    #[arg(long, default_value_t = SCORE_DECAY_INTERVAL_SECS)]
    score_decay_interval_secs: u64,

    #[arg(long, default_value_t = PEER_STALE_TIMEOUT_SECS)]
    peer_stale_timeout_secs: u64,

    // ── Gossip batching ──────────────────────────────────────────────────────
    #[arg(long, default_value_t = DEFAULT_BATCH_INTERVAL_MS)]
    tx_batch_interval_ms: u64,

    #[arg(long, default_value_t = TX_BATCH_MAX)]
    tx_batch_max: usize,

    #[arg(long, default_value_t = DEFAULT_BATCH_INTERVAL_MS)]
    cid_batch_interval_ms: u64,

    #[arg(long, default_value_t = CID_BATCH_MAX)]
    cid_batch_max: usize,

    #[arg(long, default_value_t = BLOCK_PUBLISH_TIMEOUT_SECS)]
    block_publish_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coinjecture=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("COINjecture node starting");

    // ── Chain database ────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = Arc::new(StateStore::open(data_dir.join("chain")).context("opening chain database")?);

    // ── Genesis if fresh ──────────────────────────────────────────────────────
    if let Some(path) = &args.genesis_params {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading genesis params from {}", path.display()))?;
        let params: GenesisParams =
            serde_json::from_str(&json).context("parsing genesis params JSON")?;
        Node::init_genesis(&store, &params).context("applying genesis")?;
    }

    // ── Keys ──────────────────────────────────────────────────────────────────
    let node_key =
        KeyPair::load_or_generate(data_dir.join("node.key")).context("loading node identity key")?;
    let validator_key = if args.validator {
        let path = args
            .validator_key_path
            .clone()
            .unwrap_or_else(|| data_dir.join("validator.key"));
        let key = KeyPair::load_or_generate(&path).context("loading validator key")?;
        info!(validator = %key.address, "validator key loaded");
        Some(Arc::new(key))
    } else {
        None
    };

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = NodeConfig {
        p2p: P2pConfig {
            listen_addr: format!("/ip4/0.0.0.0/tcp/{}", args.listen_port),
            quic_listen_addr: args
                .quic
                .then(|| format!("/ip4/0.0.0.0/udp/{}/quic-v1", args.listen_port)),
            bootstrap_peers: args.bootstrap.clone(),
            max_peers: args.max_peers,
            protocol_version: "/coinjecture/1.0.0".into(),
            gossip: GossipConfig {
                tx_batch_interval: Duration::from_millis(args.tx_batch_interval_ms),
                tx_batch_max: args.tx_batch_max,
                cid_batch_interval: Duration::from_millis(args.cid_batch_interval_ms),
                cid_batch_max: args.cid_batch_max,
                block_publish_timeout: Duration::from_secs(args.block_publish_timeout_secs),
                ..GossipConfig::default()
            },
            scoring: ScoringConfig {
                quarantine_threshold: args.quarantine_threshold,
                ban_threshold: args.ban_threshold,
                decay_interval: Duration::from_secs(args.score_decay_interval_secs),
                stale_timeout: Duration::from_secs(args.peer_stale_timeout_secs),
                ..ScoringConfig::default()
            },
        },
        mempool: MempoolConfig {
            max_size: args.mempool_max_size,
            max_tx_age: Duration::from_secs(args.mempool_max_tx_age_secs),
            cleanup_interval: Duration::from_secs(args.mempool_cleanup_interval_secs),
            ..MempoolConfig::default()
        },
        block: BlockConfig {
            max_tx_per_block: args.max_tx_per_block,
            gas_limit: args.block_gas_limit,
        },
        checkpoint: CheckpointConfig {
            interval: args.checkpoint_interval,
            max_checkpoints: args.max_checkpoints,
        },
        validator: args.validator,
        block_time: Duration::from_secs(args.block_time_secs),
    };

    // ── Boot ──────────────────────────────────────────────────────────────────
    let handle = Node::start(Arc::clone(&store), config, &node_key, validator_key, None)?;
    info!(peer_id = %handle.local_peer_id, "node ready");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    handle.shutdown().await;
    store.close().context("flushing state store")?;
    info!("node stopped");
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
