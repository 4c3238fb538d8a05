//! Node orchestration: boots the subsystems in dependency order, wires the
//! typed gossip channels into the mempool and block applier, runs block
//! production on validator nodes, and cascades a single shutdown signal in
//! reverse boot order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use coinjecture_consensus::{BlockApplier, BlockBuilder, BlockConfig};
use coinjecture_core::constants::BLOCK_SYNC_MAX_BLOCKS;
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::Address;
use coinjecture_core::Transaction;
use coinjecture_crypto::{tx_hash, KeyPair};
use coinjecture_genesis::GenesisParams;
use coinjecture_mempool::{spawn_janitor, Mempool, MempoolConfig};
use coinjecture_p2p::{
    spawn_batcher, spawn_maintenance, BlockMessage, BlockSyncRequest, Broadcaster, CidMessage,
    NetworkCommand, P2pConfig, P2pNetwork, PeerScoreTable, TxMessage,
};
use coinjecture_state::{CheckpointConfig, CheckpointManager, StateStore};

/// Aggregated configuration threaded through every constructor.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub p2p: P2pConfig,
    pub mempool: MempoolConfig,
    pub block: BlockConfig,
    pub checkpoint: CheckpointConfig,
    /// Produce blocks (requires a validator key).
    pub validator: bool,
    pub block_time: Duration,
}

/// Handles the embedder keeps after `Node::start`: local submission queues
/// and the shutdown trigger.
pub struct NodeHandle {
    pub local_peer_id: libp2p::PeerId,
    /// Locally submitted transactions enter the mempool and the tx gossip
    /// queue through here.
    pub local_txs: mpsc::Sender<Transaction>,
    /// Locally produced content-ID advertisements.
    pub cid_announcements: Broadcaster<CidMessage>,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Flip the cancellation signal and wait for every task to drain
    /// (bounded per task).
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("task did not stop within the drain timeout");
            }
        }
    }
}

pub struct Node;

impl Node {
    /// Bootstrap on a fresh database: apply genesis parameters once.
    pub fn init_genesis(
        store: &StateStore,
        params: &GenesisParams,
    ) -> Result<(), CoinjectureError> {
        if store.chain_state()?.genesis_timestamp == 0 {
            info!("fresh database, applying genesis");
            coinjecture_genesis::apply_genesis(store, params)?;
        } else {
            info!("existing database found, skipping genesis");
        }
        Ok(())
    }

    /// Boot every subsystem in dependency order and return the handle.
    ///
    /// Order: state store (supplied) → mempool → checkpoints → block
    /// builder/applier → peer host → gossip workers → peer-score
    /// maintenance. Shutdown reverses it via one watch signal.
    pub fn start(
        store: Arc<StateStore>,
        config: NodeConfig,
        node_key: &KeyPair,
        validator_key: Option<Arc<KeyPair>>,
        cid_handler: Option<mpsc::Sender<CidMessage>>,
    ) -> anyhow::Result<NodeHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        // ── Mempool ──────────────────────────────────────────────────────────
        let mempool = Arc::new(Mempool::new(config.mempool.clone()));
        tasks.push(spawn_janitor(Arc::clone(&mempool), shutdown_rx.clone()));

        // ── Checkpoints / consensus ──────────────────────────────────────────
        let checkpoints = Arc::new(CheckpointManager::new(
            config.checkpoint.clone(),
            validator_key.clone(),
        ));
        let builder = Arc::new(BlockBuilder::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            config.block.clone(),
        ));
        let applier = Arc::new(BlockApplier::new(
            Arc::clone(&store),
            Arc::clone(&mempool),
            Arc::clone(&checkpoints),
        ));

        // ── Peer host ────────────────────────────────────────────────────────
        let scoring = Arc::new(PeerScoreTable::new(config.p2p.scoring.clone()));
        let (network, handle) = P2pNetwork::new(
            &config.p2p,
            node_key.seed_bytes(),
            Arc::clone(&scoring),
            shutdown_rx.clone(),
        )
        .map_err(|e| anyhow::anyhow!("building P2P network: {e}"))?;
        let local_peer_id = handle.local_peer_id;
        info!(peer_id = %local_peer_id, "P2P identity");
        let P2pHandleParts {
            commands,
            inbound_txs,
            inbound_blocks,
            inbound_cids,
            sync_requests,
            sync_responses,
        } = split_handle(handle);
        tasks.push(tokio::spawn(network.run()));

        // ── Gossip broadcast workers ─────────────────────────────────────────
        let gossip = &config.p2p.gossip;
        let (tx_broadcaster, tx_batch_task) = spawn_batcher::<TxMessage>(
            "tx-broadcast",
            gossip.queue_capacity,
            gossip.tx_batch_max,
            gossip.tx_batch_interval,
            commands.clone(),
            NetworkCommand::PublishTxs,
            shutdown_rx.clone(),
        );
        tasks.push(tx_batch_task);
        let (cid_broadcaster, cid_batch_task) = spawn_batcher::<CidMessage>(
            "cid-broadcast",
            gossip.queue_capacity,
            gossip.cid_batch_max,
            gossip.cid_batch_interval,
            commands.clone(),
            NetworkCommand::PublishCids,
            shutdown_rx.clone(),
        );
        tasks.push(cid_batch_task);

        // ── Peer scoring maintenance ─────────────────────────────────────────
        tasks.push(spawn_maintenance(Arc::clone(&scoring), shutdown_rx.clone()));

        // ── Inbound transaction loop ─────────────────────────────────────────
        tasks.push(spawn_tx_loop(
            inbound_txs,
            Arc::clone(&mempool),
            Arc::clone(&scoring),
            shutdown_rx.clone(),
        ));

        // ── Inbound block loop ───────────────────────────────────────────────
        tasks.push(spawn_block_loop(
            inbound_blocks,
            Arc::clone(&applier),
            Arc::clone(&scoring),
            commands.clone(),
            gossip.block_publish_timeout,
            shutdown_rx.clone(),
        ));

        // ── Content-ID loop ──────────────────────────────────────────────────
        tasks.push(spawn_cid_loop(
            inbound_cids,
            Arc::clone(&scoring),
            cid_handler,
            shutdown_rx.clone(),
        ));

        // ── Block-sync responder and consumer ────────────────────────────────
        tasks.push(spawn_sync_responder(
            sync_requests,
            Arc::clone(&store),
            commands.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_sync_consumer(
            sync_responses,
            Arc::clone(&applier),
            shutdown_rx.clone(),
        ));

        // ── Local submission queue ───────────────────────────────────────────
        let (local_tx_sender, local_tx_receiver) = mpsc::channel::<Transaction>(256);
        tasks.push(spawn_local_tx_loop(
            local_tx_receiver,
            Arc::clone(&mempool),
            tx_broadcaster.clone(),
            shutdown_rx.clone(),
        ));

        // ── Block production (validator nodes) ───────────────────────────────
        if config.validator {
            let validator_key = validator_key
                .ok_or_else(|| anyhow::anyhow!("validator mode requires a validator key"))?;
            tasks.push(spawn_producer(
                builder,
                applier,
                validator_key.address,
                commands,
                config.block_time,
                gossip.block_publish_timeout,
                Arc::clone(&shutdown_tx),
                shutdown_rx,
            ));
        }

        Ok(NodeHandle {
            local_peer_id,
            local_txs: local_tx_sender,
            cid_announcements: cid_broadcaster,
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

// Destructure the p2p handle into the pieces each loop owns.
struct P2pHandleParts {
    commands: mpsc::Sender<NetworkCommand>,
    inbound_txs: mpsc::Receiver<coinjecture_p2p::InboundTx>,
    inbound_blocks: mpsc::Receiver<coinjecture_p2p::InboundBlock>,
    inbound_cids: mpsc::Receiver<coinjecture_p2p::InboundCid>,
    sync_requests: mpsc::Receiver<coinjecture_p2p::InboundSyncRequest>,
    sync_responses: mpsc::Receiver<coinjecture_p2p::SyncResponse>,
}

fn split_handle(handle: coinjecture_p2p::P2pHandle) -> P2pHandleParts {
    P2pHandleParts {
        commands: handle.commands,
        inbound_txs: handle.inbound_txs,
        inbound_blocks: handle.inbound_blocks,
        inbound_cids: handle.inbound_cids,
        sync_requests: handle.sync_requests,
        sync_responses: handle.sync_responses,
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Inbound loops ────────────────────────────────────────────────────────────

fn spawn_tx_loop(
    mut inbound: mpsc::Receiver<coinjecture_p2p::InboundTx>,
    mempool: Arc<Mempool>,
    scoring: Arc<PeerScoreTable>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = inbound.recv() => {
                    let Some(event) = event else { break };
                    let (tx, claimed) = match event.message.to_tx() {
                        Ok(decoded) => decoded,
                        Err(_) => {
                            scoring.record_malformed(&event.source);
                            continue;
                        }
                    };
                    if tx_hash(&tx) != claimed {
                        debug!(peer = %event.source, "tx hash mismatch");
                        scoring.record_invalid(&event.source);
                        continue;
                    }
                    match mempool.add(tx) {
                        Ok(hash) => {
                            debug!(tx = %hash, peer = %event.source, "gossip tx pooled");
                            scoring.record_valid(&event.source);
                        }
                        Err(CoinjectureError::MempoolFull { .. }) => {
                            // Back-pressure, not the peer's fault.
                            warn!("mempool full, dropping gossiped tx");
                        }
                        Err(e) => {
                            debug!(error = %e, peer = %event.source, "gossip tx rejected");
                            scoring.record_invalid(&event.source);
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_block_loop(
    mut inbound: mpsc::Receiver<coinjecture_p2p::InboundBlock>,
    applier: Arc<BlockApplier>,
    scoring: Arc<PeerScoreTable>,
    commands: mpsc::Sender<NetworkCommand>,
    publish_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = inbound.recv() => {
                    let Some(event) = event else { break };
                    let (block, claimed) = match event.message.to_block() {
                        Ok(decoded) => decoded,
                        Err(_) => {
                            scoring.record_malformed(&event.source);
                            continue;
                        }
                    };
                    match applier.apply_block(&block, Some(claimed), now()) {
                        Ok(_) => {
                            scoring.record_valid(&event.source);
                            // Valid blocks republish immediately.
                            let send = commands.send_timeout(
                                NetworkCommand::PublishBlock(event.message),
                                publish_timeout,
                            );
                            if send.await.is_err() {
                                warn!("block republish timed out");
                            }
                        }
                        Err(CoinjectureError::NonSequentialBlock { expected, got })
                            if got > expected =>
                        {
                            // A gap, not an offence: pull the missing range
                            // from the peer that showed us the future.
                            debug!(expected, got, peer = %event.source, "block gap, requesting sync");
                            let request = BlockSyncRequest {
                                from_block: expected,
                                to_block: got - 1,
                                max_blocks: BLOCK_SYNC_MAX_BLOCKS,
                            };
                            let _ = commands
                                .send(NetworkCommand::RequestBlocks {
                                    peer: event.source,
                                    request,
                                })
                                .await;
                        }
                        Err(CoinjectureError::DuplicateBlock(_)) => {
                            // Re-gossip of something we already hold.
                        }
                        Err(e) => {
                            warn!(error = %e, peer = %event.source, "gossip block rejected");
                            scoring.record_invalid(&event.source);
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_cid_loop(
    mut inbound: mpsc::Receiver<coinjecture_p2p::InboundCid>,
    scoring: Arc<PeerScoreTable>,
    handler: Option<mpsc::Sender<CidMessage>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = inbound.recv() => {
                    let Some(event) = event else { break };
                    if event.message.cid.is_empty() {
                        scoring.record_invalid(&event.source);
                        continue;
                    }
                    scoring.record_valid(&event.source);
                    info!(
                        cid = %event.message.cid,
                        kind = ?event.message.cid_type,
                        block = event.message.block_number,
                        "content advertised"
                    );
                    if let Some(handler) = &handler {
                        if handler.try_send(event.message).is_err() {
                            warn!("cid handler queue full, dropping advertisement");
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_sync_responder(
    mut requests: mpsc::Receiver<coinjecture_p2p::InboundSyncRequest>,
    store: Arc<StateStore>,
    commands: mpsc::Sender<NetworkCommand>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = requests.recv() => {
                    let Some(event) = event else { break };
                    let response = match build_sync_response(&store, &event.request) {
                        Ok(response) => response,
                        Err(e) => {
                            debug!(error = %e, peer = %event.peer, "refusing sync request");
                            coinjecture_p2p::BlockSyncResponse { blocks: Vec::new() }
                        }
                    };
                    let _ = commands
                        .send(NetworkCommand::RespondBlocks {
                            channel: event.channel,
                            response,
                        })
                        .await;
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

/// Assemble a block-sync response from the archive (read locks only).
fn build_sync_response(
    store: &StateStore,
    request: &BlockSyncRequest,
) -> Result<coinjecture_p2p::BlockSyncResponse, CoinjectureError> {
    let end = request.clamped_end()?;
    let mut blocks = Vec::new();
    for stored in store.get_block_range(request.from_block, end)? {
        let block = stored.to_block()?;
        let hashes: Vec<_> = block.transactions.iter().map(tx_hash).collect();
        blocks.push(BlockMessage::from_block(&block, stored.block_hash, &hashes));
    }
    Ok(coinjecture_p2p::BlockSyncResponse { blocks })
}

fn spawn_sync_consumer(
    mut responses: mpsc::Receiver<coinjecture_p2p::SyncResponse>,
    applier: Arc<BlockApplier>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = responses.recv() => {
                    let Some(event) = event else { break };
                    let mut blocks = event.response.blocks;
                    blocks.sort_by_key(|b| b.block_number);
                    for message in blocks {
                        let (block, claimed) = match message.to_block() {
                            Ok(decoded) => decoded,
                            Err(e) => {
                                warn!(error = %e, "undecodable block in sync response");
                                break;
                            }
                        };
                        match applier.apply_block(&block, Some(claimed), now()) {
                            Ok(_) => {}
                            Err(CoinjectureError::DuplicateBlock(_)) => continue,
                            Err(e) => {
                                warn!(error = %e, number = block.header.block_number, "sync block rejected");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

fn spawn_local_tx_loop(
    mut local: mpsc::Receiver<Transaction>,
    mempool: Arc<Mempool>,
    broadcaster: Broadcaster<TxMessage>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                tx = local.recv() => {
                    let Some(tx) = tx else { break };
                    match mempool.add(tx.clone()) {
                        Ok(hash) => {
                            info!(tx = %hash, "local tx accepted");
                            let message = TxMessage::from_tx(&tx, hash);
                            if broadcaster.enqueue(message).is_err() {
                                warn!(tx = %hash, "broadcast queue full, tx stays local");
                            }
                        }
                        Err(e) => warn!(error = %e, "local tx rejected"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

// ── Block production ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn spawn_producer(
    builder: Arc<BlockBuilder>,
    applier: Arc<BlockApplier>,
    validator: Address,
    commands: mpsc::Sender<NetworkCommand>,
    block_time: Duration,
    publish_timeout: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(block_time);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let timestamp = now();
                    let block = match builder.build_block(validator, timestamp) {
                        Ok(block) => block,
                        Err(e) => {
                            warn!(error = %e, "block build failed");
                            continue;
                        }
                    };
                    let number = block.header.block_number;
                    match applier.apply_block(&block, None, timestamp) {
                        Ok(hash) => {
                            let hashes: Vec<_> =
                                block.transactions.iter().map(tx_hash).collect();
                            let message = BlockMessage::from_block(&block, hash, &hashes);
                            let send = commands.send_timeout(
                                NetworkCommand::PublishBlock(message),
                                publish_timeout,
                            );
                            if send.await.is_err() {
                                warn!(number, "block publish timed out");
                            }
                        }
                        Err(e) => {
                            // A locally built block failing to apply is a
                            // programming bug; stop producing.
                            error!(error = %e, number, "locally built block rejected, halting producer");
                            let _ = shutdown_tx.send(true);
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("block producer stopped");
    })
}
