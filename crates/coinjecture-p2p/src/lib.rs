//! coinjecture-p2p
//!
//! libp2p networking layer for COINjecture nodes.
//!
//! GossipSub carries three versioned topics (transactions, blocks, content
//! IDs); Kademlia handles peer discovery and bootstrap; Identify and Ping
//! maintain connection metadata and liveness; a JSON request-response
//! protocol serves block-sync ranges. Peer reputation is a leaf table the
//! event loop consults before forwarding anything.

pub mod broadcast;
pub mod config;
pub mod message;
pub mod network;
pub mod scoring;

pub use broadcast::{spawn_batcher, Broadcaster};
pub use config::{GossipConfig, P2pConfig, ScoringConfig};
pub use message::{
    BlockMessage, BlockSyncRequest, BlockSyncResponse, CidMessage, CidMetadata, CidType, TxMessage,
};
pub use network::{
    InboundBlock, InboundCid, InboundSyncRequest, InboundTx, NetworkCommand, P2pHandle,
    P2pNetwork, SyncResponse,
};
pub use scoring::{spawn_maintenance, PeerRecord, PeerScoreTable};
