use std::time::Duration;

use coinjecture_core::constants::{
    BLOCK_PUBLISH_TIMEOUT_SECS, BROADCAST_QUEUE_CAPACITY, CID_BATCH_MAX,
    DEFAULT_BATCH_INTERVAL_MS, PEER_BAN_THRESHOLD, PEER_INITIAL_SCORE,
    PEER_QUARANTINE_THRESHOLD, PEER_STALE_TIMEOUT_SECS, SCORE_DECAY_INTERVAL_SECS, TX_BATCH_MAX,
};

/// Batching and timeout knobs for the gossip layer.
#[derive(Debug, Clone)]
pub struct GossipConfig {
    pub tx_batch_interval: Duration,
    pub tx_batch_max: usize,
    pub cid_batch_interval: Duration,
    pub cid_batch_max: usize,
    pub block_publish_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            tx_batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            tx_batch_max: TX_BATCH_MAX,
            cid_batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            cid_batch_max: CID_BATCH_MAX,
            block_publish_timeout: Duration::from_secs(BLOCK_PUBLISH_TIMEOUT_SECS),
            queue_capacity: BROADCAST_QUEUE_CAPACITY,
        }
    }
}

/// Peer reputation thresholds and maintenance cadence.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub initial_score: i32,
    pub quarantine_threshold: i32,
    pub ban_threshold: i32,
    pub decay_interval: Duration,
    pub stale_timeout: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            initial_score: PEER_INITIAL_SCORE,
            quarantine_threshold: PEER_QUARANTINE_THRESHOLD,
            ban_threshold: PEER_BAN_THRESHOLD,
            decay_interval: Duration::from_secs(SCORE_DECAY_INTERVAL_SECS),
            stale_timeout: Duration::from_secs(PEER_STALE_TIMEOUT_SECS),
        }
    }
}

/// Configuration for the COINjecture peer host.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// TCP listen multiaddress (e.g. "/ip4/0.0.0.0/tcp/7000").
    pub listen_addr: String,
    /// Optional QUIC listen multiaddress (e.g. "/ip4/0.0.0.0/udp/7000/quic-v1").
    pub quic_listen_addr: Option<String>,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Disconnect newly established connections beyond this count.
    pub max_peers: usize,
    /// Protocol version string advertised to peers.
    pub protocol_version: String,
    pub gossip: GossipConfig,
    pub scoring: ScoringConfig,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7000".into(),
            quic_listen_addr: None,
            bootstrap_peers: Vec::new(),
            max_peers: 50,
            protocol_version: "/coinjecture/1.0.0".into(),
            gossip: GossipConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}
