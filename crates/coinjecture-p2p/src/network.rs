use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use libp2p::request_response::{self, json, ProtocolSupport, ResponseChannel};
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, identify, kad, noise, ping, tcp, upnp, yamux};
use libp2p::{Multiaddr, PeerId, StreamProtocol, Swarm};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use coinjecture_core::constants::{BLOCK_SYNC_PROTOCOL, BLOCK_TOPIC, CID_TOPIC, TX_TOPIC};

use crate::config::P2pConfig;
use crate::message::{BlockMessage, BlockSyncRequest, BlockSyncResponse, CidMessage, TxMessage};
use crate::scoring::PeerScoreTable;

// ── Behaviour ────────────────────────────────────────────────────────────────

/// Combined libp2p network behaviour for a COINjecture node.
///
/// GossipSub carries the three gossip topics; Kademlia is a peer-discovery
/// index only (never content storage); the JSON request-response protocol
/// serves block-sync; UPnP maps the listen port when a gateway cooperates.
#[derive(NetworkBehaviour)]
pub struct NodeBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub block_sync: json::Behaviour<BlockSyncRequest, BlockSyncResponse>,
    pub upnp: upnp::tokio::Behaviour,
}

// ── Commands and events ──────────────────────────────────────────────────────

/// Instructions from the node into the swarm task.
pub enum NetworkCommand {
    PublishTxs(Vec<TxMessage>),
    PublishBlock(BlockMessage),
    PublishCids(Vec<CidMessage>),
    RequestBlocks {
        peer: PeerId,
        request: BlockSyncRequest,
    },
    RespondBlocks {
        channel: ResponseChannel<BlockSyncResponse>,
        response: BlockSyncResponse,
    },
    Dial(Multiaddr),
    FindPeer(PeerId),
}

pub struct InboundTx {
    pub source: PeerId,
    pub message: TxMessage,
}

pub struct InboundBlock {
    pub source: PeerId,
    pub message: BlockMessage,
}

pub struct InboundCid {
    pub source: PeerId,
    pub message: CidMessage,
}

pub struct InboundSyncRequest {
    pub peer: PeerId,
    pub request: BlockSyncRequest,
    pub channel: ResponseChannel<BlockSyncResponse>,
}

pub struct SyncResponse {
    pub peer: PeerId,
    pub response: BlockSyncResponse,
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Application-facing handle returned from [`P2pNetwork::new`].
///
/// One typed inbound channel per topic; consumers own the receivers.
pub struct P2pHandle {
    pub local_peer_id: PeerId,
    pub commands: mpsc::Sender<NetworkCommand>,
    pub inbound_txs: mpsc::Receiver<InboundTx>,
    pub inbound_blocks: mpsc::Receiver<InboundBlock>,
    pub inbound_cids: mpsc::Receiver<InboundCid>,
    pub sync_requests: mpsc::Receiver<InboundSyncRequest>,
    pub sync_responses: mpsc::Receiver<SyncResponse>,
    peers: Arc<Mutex<HashSet<PeerId>>>,
    listen_addrs: Arc<Mutex<Vec<Multiaddr>>>,
}

impl P2pHandle {
    pub fn id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn addrs(&self) -> Vec<Multiaddr> {
        self.listen_addrs.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers
            .lock()
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Kick off a DHT lookup for `peer`.
    pub async fn find_peer(&self, peer: PeerId) {
        let _ = self.commands.send(NetworkCommand::FindPeer(peer)).await;
    }

    /// Dial additional bootstrap peers after startup.
    pub async fn connect_bootstrap(&self, addrs: Vec<Multiaddr>) {
        for addr in addrs {
            let _ = self.commands.send(NetworkCommand::Dial(addr)).await;
        }
    }
}

// ── Network ──────────────────────────────────────────────────────────────────

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct P2pNetwork {
    swarm: Swarm<NodeBehaviour>,
    tx_topic: gossipsub::IdentTopic,
    block_topic: gossipsub::IdentTopic,
    cid_topic: gossipsub::IdentTopic,
    max_peers: usize,
    scoring: Arc<PeerScoreTable>,
    commands: mpsc::Receiver<NetworkCommand>,
    inbound_txs: mpsc::Sender<InboundTx>,
    inbound_blocks: mpsc::Sender<InboundBlock>,
    inbound_cids: mpsc::Sender<InboundCid>,
    sync_requests: mpsc::Sender<InboundSyncRequest>,
    sync_responses: mpsc::Sender<SyncResponse>,
    peers: Arc<Mutex<HashSet<PeerId>>>,
    listen_addrs: Arc<Mutex<Vec<Multiaddr>>>,
    shutdown: watch::Receiver<bool>,
}

impl P2pNetwork {
    /// Build the swarm from a persistent Ed25519 identity seed and return
    /// `(P2pNetwork, P2pHandle)`.
    pub fn new(
        config: &P2pConfig,
        identity_seed: [u8; 32],
        scoring: Arc<PeerScoreTable>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let tx_topic = gossipsub::IdentTopic::new(TX_TOPIC);
        let block_topic = gossipsub::IdentTopic::new(BLOCK_TOPIC);
        let cid_topic = gossipsub::IdentTopic::new(CID_TOPIC);

        let mut seed = identity_seed;
        let identity = libp2p::identity::Keypair::ed25519_from_bytes(&mut seed)?;
        let protocol_version = config.protocol_version.clone();

        let mut swarm = libp2p::SwarmBuilder::with_existing_identity(identity)
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_quic()
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                let block_sync = json::Behaviour::new(
                    [(
                        StreamProtocol::new(BLOCK_SYNC_PROTOCOL),
                        ProtocolSupport::Full,
                    )],
                    request_response::Config::default(),
                );

                let upnp = upnp::tokio::Behaviour::default();

                Ok(NodeBehaviour {
                    gossipsub,
                    kademlia,
                    identify,
                    ping,
                    block_sync,
                    upnp,
                })
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&tx_topic)?;
        swarm.behaviour_mut().gossipsub.subscribe(&block_topic)?;
        swarm.behaviour_mut().gossipsub.subscribe(&cid_topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;
        if let Some(quic) = &config.quic_listen_addr {
            let quic_addr: Multiaddr = quic.parse()?;
            swarm.listen_on(quic_addr)?;
        }

        for addr_str in &config.bootstrap_peers {
            match addr_str.parse::<Multiaddr>() {
                Ok(addr) => {
                    if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                        swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                        debug!(peer = %peer_id, "added bootstrap peer");
                    }
                    if let Err(e) = swarm.dial(addr.clone()) {
                        warn!(addr = %addr, error = %e, "bootstrap dial failed");
                    }
                }
                Err(e) => warn!(addr = %addr_str, error = %e, "bad bootstrap multiaddress"),
            }
        }
        if !config.bootstrap_peers.is_empty() {
            let _ = swarm.behaviour_mut().kademlia.bootstrap();
        }

        let local_peer_id = *swarm.local_peer_id();
        let (command_tx, command_rx) = mpsc::channel(256);
        let (tx_tx, tx_rx) = mpsc::channel(256);
        let (block_tx, block_rx) = mpsc::channel(64);
        let (cid_tx, cid_rx) = mpsc::channel(256);
        let (req_tx, req_rx) = mpsc::channel(32);
        let (resp_tx, resp_rx) = mpsc::channel(32);
        let peers = Arc::new(Mutex::new(HashSet::new()));
        let listen_addrs = Arc::new(Mutex::new(Vec::new()));

        let network = P2pNetwork {
            swarm,
            tx_topic,
            block_topic,
            cid_topic,
            max_peers: config.max_peers,
            scoring,
            commands: command_rx,
            inbound_txs: tx_tx,
            inbound_blocks: block_tx,
            inbound_cids: cid_tx,
            sync_requests: req_tx,
            sync_responses: resp_tx,
            peers: Arc::clone(&peers),
            listen_addrs: Arc::clone(&listen_addrs),
            shutdown,
        };
        let handle = P2pHandle {
            local_peer_id,
            commands: command_tx,
            inbound_txs: tx_rx,
            inbound_blocks: block_rx,
            inbound_cids: cid_rx,
            sync_requests: req_rx,
            sync_responses: resp_rx,
            peers,
            listen_addrs,
        };

        Ok((network, handle))
    }

    /// Drive the P2P event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                }

                event = self.swarm.select_next_some() => {
                    self.handle_event(event);
                }

                _ = self.shutdown.changed() => {
                    // Publish whatever is already queued, then stop.
                    while let Ok(command) = self.commands.try_recv() {
                        self.handle_command(command);
                    }
                    info!("p2p event loop stopping");
                    break;
                }
            }
        }
    }

    fn publish(&mut self, topic: gossipsub::IdentTopic, data: Vec<u8>) {
        if let Err(e) = self.swarm.behaviour_mut().gossipsub.publish(topic, data) {
            warn!(error = %e, "gossipsub publish failed");
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::PublishTxs(batch) => {
                let topic = self.tx_topic.clone();
                for msg in batch {
                    self.publish(topic.clone(), msg.to_bytes());
                }
            }
            NetworkCommand::PublishBlock(msg) => {
                let topic = self.block_topic.clone();
                self.publish(topic, msg.to_bytes());
            }
            NetworkCommand::PublishCids(batch) => {
                let topic = self.cid_topic.clone();
                for msg in batch {
                    self.publish(topic.clone(), msg.to_bytes());
                }
            }
            NetworkCommand::RequestBlocks { peer, request } => {
                self.swarm
                    .behaviour_mut()
                    .block_sync
                    .send_request(&peer, request);
            }
            NetworkCommand::RespondBlocks { channel, response } => {
                if self
                    .swarm
                    .behaviour_mut()
                    .block_sync
                    .send_response(channel, response)
                    .is_err()
                {
                    debug!("block-sync response channel already closed");
                }
            }
            NetworkCommand::Dial(addr) => {
                if let Err(e) = self.swarm.dial(addr) {
                    warn!(error = %e, "dial failed");
                }
            }
            NetworkCommand::FindPeer(peer) => {
                self.swarm.behaviour_mut().kademlia.get_closest_peers(peer);
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<NodeBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "P2P listening on");
                if let Ok(mut addrs) = self.listen_addrs.lock() {
                    addrs.push(address);
                }
            }
            SwarmEvent::Behaviour(NodeBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                self.handle_gossip(propagation_source, message);
            }
            SwarmEvent::Behaviour(NodeBehaviourEvent::BlockSync(
                request_response::Event::Message { peer, message, .. },
            )) => match message {
                request_response::Message::Request {
                    request, channel, ..
                } => {
                    if self.scoring.is_banned(&peer) {
                        debug!(peer = %peer, "dropping sync request from banned peer");
                        return;
                    }
                    if self
                        .sync_requests
                        .try_send(InboundSyncRequest {
                            peer,
                            request,
                            channel,
                        })
                        .is_err()
                    {
                        warn!("sync request channel full, dropping request");
                    }
                }
                request_response::Message::Response { response, .. } => {
                    if self
                        .sync_responses
                        .try_send(SyncResponse { peer, response })
                        .is_err()
                    {
                        warn!("sync response channel full, dropping response");
                    }
                }
            },
            SwarmEvent::Behaviour(NodeBehaviourEvent::BlockSync(
                request_response::Event::OutboundFailure { peer, error, .. },
            )) => {
                debug!(peer = %peer, error = %error, "block-sync outbound failure");
                self.scoring.record_timeout(&peer);
            }
            SwarmEvent::Behaviour(NodeBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm
                        .behaviour_mut()
                        .kademlia
                        .add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(NodeBehaviourEvent::Upnp(event)) => {
                debug!(?event, "upnp");
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                if self.scoring.is_banned(&peer_id) {
                    debug!(peer = %peer_id, "refusing connection from banned peer");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                    return;
                }
                let count = {
                    if let Ok(mut peers) = self.peers.lock() {
                        peers.insert(peer_id);
                        peers.len()
                    } else {
                        0
                    }
                };
                if count > self.max_peers {
                    debug!(peer = %peer_id, count, "over peer watermark, disconnecting");
                    let _ = self.swarm.disconnect_peer_id(peer_id);
                } else {
                    debug!(peer = %peer_id, "connection established");
                }
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                if let Ok(mut peers) = self.peers.lock() {
                    peers.remove(&peer_id);
                }
                debug!(peer = %peer_id, "connection closed");
            }
            _ => {}
        }
    }

    /// Route one gossip message to its topic channel. Self-messages and
    /// messages from banned or quarantined peers are dropped; undecodable
    /// bytes penalise the propagation source.
    fn handle_gossip(&mut self, source: PeerId, message: gossipsub::Message) {
        if message.source == Some(*self.swarm.local_peer_id()) {
            return;
        }
        if self.scoring.is_banned(&source) {
            debug!(peer = %source, "dropping message from banned peer");
            let _ = self.swarm.disconnect_peer_id(source);
            return;
        }
        if self.scoring.is_quarantined(&source) {
            debug!(peer = %source, "dropping message from quarantined peer");
            return;
        }

        if message.topic == self.tx_topic.hash() {
            match TxMessage::from_bytes(&message.data) {
                Ok(msg) => {
                    if self.inbound_txs.try_send(InboundTx { source, message: msg }).is_err() {
                        warn!("inbound tx channel full, dropping message");
                    }
                }
                Err(_) => self.scoring.record_malformed(&source),
            }
        } else if message.topic == self.block_topic.hash() {
            match BlockMessage::from_bytes(&message.data) {
                Ok(msg) => {
                    if self
                        .inbound_blocks
                        .try_send(InboundBlock { source, message: msg })
                        .is_err()
                    {
                        warn!("inbound block channel full, dropping message");
                    }
                }
                Err(_) => self.scoring.record_malformed(&source),
            }
        } else if message.topic == self.cid_topic.hash() {
            match CidMessage::from_bytes(&message.data) {
                Ok(msg) => {
                    if self.inbound_cids.try_send(InboundCid { source, message: msg }).is_err() {
                        warn!("inbound cid channel full, dropping message");
                    }
                }
                Err(_) => self.scoring.record_malformed(&source),
            }
        } else {
            debug!(topic = %message.topic, "message on unknown topic");
        }
    }
}
