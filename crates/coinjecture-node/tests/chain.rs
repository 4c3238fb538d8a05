//! End-to-end chain scenarios: build → apply → archive → checkpoint, plus
//! the gossip wire round-trip between two stores.
//!
//! Everything runs in-process against temp-dir databases; the HTTP surface
//! and live networking are exercised elsewhere.

use std::sync::Arc;

use coinjecture_consensus::{BlockApplier, BlockBuilder, BlockConfig};
use coinjecture_core::constants::{CODEC_VERSION, TRANSFER_GAS_MIN};
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::{Address, BlockHash, Signature};
use coinjecture_core::{Transaction, TxType};
use coinjecture_crypto::{merkle_root, tx_hash, verify_proof, KeyPair};
use coinjecture_genesis::{apply_genesis, GenesisAccount, GenesisParams};
use coinjecture_mempool::{Mempool, MempoolConfig};
use coinjecture_p2p::BlockMessage;
use coinjecture_state::{CheckpointConfig, CheckpointManager, StateStore};

// ── Harness ──────────────────────────────────────────────────────────────────

struct TestChain {
    store: Arc<StateStore>,
    mempool: Arc<Mempool>,
    checkpoints: Arc<CheckpointManager>,
    builder: BlockBuilder,
    applier: BlockApplier,
    validator: Address,
    data_dir: std::path::PathBuf,
}

impl Drop for TestChain {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn chain_with(tag: &str, block_config: BlockConfig, checkpoint_interval: u64) -> TestChain {
    let data_dir = std::env::temp_dir().join(format!("cjchain-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    let store = Arc::new(StateStore::open(&data_dir).unwrap());
    let mempool = Arc::new(Mempool::new(MempoolConfig::default()));
    let checkpoints = Arc::new(CheckpointManager::new(
        CheckpointConfig {
            interval: checkpoint_interval,
            max_checkpoints: 10,
        },
        Some(Arc::new(KeyPair::generate())),
    ));
    let builder = BlockBuilder::new(Arc::clone(&store), Arc::clone(&mempool), block_config);
    let applier = BlockApplier::new(
        Arc::clone(&store),
        Arc::clone(&mempool),
        Arc::clone(&checkpoints),
    );
    TestChain {
        store,
        mempool,
        checkpoints,
        builder,
        applier,
        validator: Address::from_bytes([0x11; 32]),
        data_dir,
    }
}

fn chain(tag: &str) -> TestChain {
    chain_with(tag, BlockConfig::default(), 100)
}

fn transfer(kp: &KeyPair, to: Address, amount: u64, fee: u64, nonce: u64) -> Transaction {
    let mut tx = Transaction {
        codec_version: CODEC_VERSION,
        tx_type: TxType::Transfer,
        from: kp.address,
        to,
        amount,
        fee,
        gas_limit: TRANSFER_GAS_MIN,
        gas_price: 1,
        nonce,
        data: Vec::new(),
        timestamp: 1_700_000_000,
        signature: Signature::ZERO,
    };
    coinjecture_crypto::sign_tx(&mut tx, kp);
    tx
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[test]
fn empty_block_advances_the_head() {
    let c = chain("s1");
    let block = c.builder.build_block(c.validator, 1_000).unwrap();

    assert_eq!(block.header.block_number, 1);
    assert_eq!(block.header.parent_hash, BlockHash::ZERO);
    assert!(block.transactions.is_empty());
    assert_eq!(block.header.tx_root, [0u8; 32]);
    assert_eq!(block.header.gas_used, 0);

    let hash = c.applier.apply_block(&block, None, 1_000).unwrap();
    assert!(!hash.is_zero());
    assert_eq!(c.store.chain_state().unwrap().head_block_number, 1);
}

#[test]
fn single_transfer_settles() {
    let c = chain("s2");
    let alice = KeyPair::generate();
    let bob = Address::from_bytes([0xB0; 32]);
    c.store.create_account(alice.address, 1_000, 0).unwrap();

    c.mempool.add(transfer(&alice, bob, 100, 10, 0)).unwrap();
    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert_eq!(block.transactions.len(), 1);
    c.applier.apply_block(&block, None, 1_000).unwrap();

    let a = c.store.get_account(&alice.address).unwrap().unwrap();
    let b = c.store.get_account(&bob).unwrap().unwrap();
    assert_eq!((a.balance, a.nonce), (890, 1));
    assert_eq!((b.balance, b.nonce), (100, 0));

    let chain_state = c.store.chain_state().unwrap();
    assert_eq!(chain_state.head_block_number, 1);
    assert_eq!(chain_state.total_transactions, 1);
}

#[test]
fn wrong_nonce_stays_pooled_and_unapplied() {
    let c = chain("s3");
    let alice = KeyPair::generate();
    c.store.create_account(alice.address, 1_000, 0).unwrap();

    let hash = c
        .mempool
        .add(transfer(&alice, Address::from_bytes([0xB0; 32]), 100, 10, 5))
        .unwrap();
    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert!(block.transactions.is_empty());
    assert!(c.mempool.contains(&hash));

    c.applier.apply_block(&block, None, 1_000).unwrap();
    let a = c.store.get_account(&alice.address).unwrap().unwrap();
    assert_eq!((a.balance, a.nonce), (1_000, 0));
}

#[test]
fn insufficient_balance_excluded() {
    let c = chain("s4");
    let alice = KeyPair::generate();
    c.store.create_account(alice.address, 50, 0).unwrap();

    c.mempool
        .add(transfer(&alice, Address::from_bytes([0xB0; 32]), 100, 10, 0))
        .unwrap();
    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert!(block.transactions.is_empty());

    let a = c.store.get_account(&alice.address).unwrap().unwrap();
    assert_eq!(a.balance, 50);
}

#[test]
fn gas_cap_limits_block_to_two_transfers() {
    let c = chain_with(
        "s5",
        BlockConfig {
            max_tx_per_block: 1_000,
            gas_limit: 50_000,
        },
        100,
    );
    let alice = KeyPair::generate();
    let bob = Address::from_bytes([0xB0; 32]);
    c.store.create_account(alice.address, 1_000_000, 0).unwrap();
    for nonce in 0..5 {
        c.mempool.add(transfer(&alice, bob, 100, 10, nonce)).unwrap();
    }

    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(block.header.gas_used, 42_000);
    c.applier.apply_block(&block, None, 1_000).unwrap();
}

#[test]
fn multi_tx_block_is_consistent() {
    let c = chain("s6");
    let alice = KeyPair::generate();
    let bob = Address::from_bytes([0xB0; 32]);
    let carol = Address::from_bytes([0xC0; 32]);
    c.store.create_account(alice.address, 1_000, 0).unwrap();

    let tx1 = transfer(&alice, bob, 100, 10, 0);
    let tx2 = transfer(&alice, carol, 100, 10, 1);
    c.mempool.add(tx1.clone()).unwrap();
    c.mempool.add(tx2.clone()).unwrap();

    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(
        block.header.tx_root,
        merkle_root(&[tx_hash(&tx1).0, tx_hash(&tx2).0])
    );
    c.applier.apply_block(&block, None, 1_000).unwrap();

    let a = c.store.get_account(&alice.address).unwrap().unwrap();
    assert_eq!((a.balance, a.nonce), (780, 2));
    assert_eq!(c.store.get_account(&bob).unwrap().unwrap().balance, 100);
    assert_eq!(c.store.get_account(&carol).unwrap().unwrap().balance, 100);

    // Inclusion proofs round-trip against the archived root.
    let stored = c.store.get_block_by_number(1).unwrap().unwrap();
    let leaves = [tx_hash(&tx1).0, tx_hash(&tx2).0];
    for (i, leaf) in leaves.iter().enumerate() {
        let proof = coinjecture_crypto::build_proof(&leaves, i).unwrap();
        assert!(verify_proof(leaf, &proof, &stored.header.tx_root, i));
    }
}

#[test]
fn checkpoint_fast_sync_points_past_the_snapshot() {
    let c = chain_with("s8", BlockConfig::default(), 5);
    for i in 0..5 {
        let ts = 1_000 + i;
        let block = c.builder.build_block(c.validator, ts).unwrap();
        c.applier.apply_block(&block, None, ts).unwrap();
    }

    let cp = c.checkpoints.get(5).unwrap().expect("checkpoint at 5");
    let archived = c.store.get_block_by_number(5).unwrap().unwrap();
    assert_eq!(cp.block_hash, archived.block_hash);
    assert_eq!(cp.state_root, archived.header.state_root);
    assert!(c.checkpoints.verify(&cp));

    let (start, next) = c.checkpoints.sync_from(12).unwrap();
    assert_eq!(start.unwrap().block_number, 5);
    assert_eq!(next, 6);
}

// ── Cross-cutting properties ─────────────────────────────────────────────────

#[test]
fn consecutive_blocks_link_and_order() {
    let c = chain("order");
    let mut hashes = Vec::new();
    for i in 0..3 {
        let ts = 1_000 + i;
        let block = c.builder.build_block(c.validator, ts).unwrap();
        hashes.push(c.applier.apply_block(&block, None, ts).unwrap());
    }
    for n in 1..=3u64 {
        let stored = c.store.get_block_by_number(n).unwrap().unwrap();
        assert_eq!(stored.block_hash, hashes[(n - 1) as usize]);
        if n > 1 {
            let parent = c.store.get_block_by_number(n - 1).unwrap().unwrap();
            assert_eq!(stored.header.parent_hash, parent.block_hash);
            assert!(stored.header.timestamp > parent.header.timestamp);
        }
    }
    assert_eq!(c.store.get_block_count().unwrap(), 3);
}

#[test]
fn balances_conserve_minus_burned_fees() {
    let c = chain("conserve");
    let alice = KeyPair::generate();
    let bob = KeyPair::generate();
    c.store.create_account(alice.address, 10_000, 0).unwrap();
    c.store.create_account(bob.address, 10_000, 0).unwrap();

    c.mempool.add(transfer(&alice, bob.address, 500, 25, 0)).unwrap();
    c.mempool.add(transfer(&bob, alice.address, 300, 15, 0)).unwrap();
    let block = c.builder.build_block(c.validator, 1_000).unwrap();
    assert_eq!(block.transactions.len(), 2);
    c.applier.apply_block(&block, None, 1_000).unwrap();

    let a = c.store.get_account(&alice.address).unwrap().unwrap();
    let b = c.store.get_account(&bob.address).unwrap().unwrap();
    // 20,000 total minus the 40 beans of burned fees.
    assert_eq!(a.balance + b.balance, 19_960);
}

#[test]
fn genesis_funds_flow_into_blocks() {
    let data_dir = std::env::temp_dir().join(format!("cjchain-genesis-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    let store = Arc::new(StateStore::open(&data_dir).unwrap());

    let alice = KeyPair::generate();
    let validator = KeyPair::generate();
    apply_genesis(
        &store,
        &GenesisParams {
            genesis_timestamp: 900,
            block_time_seconds: 10,
            initial_accounts: vec![GenesisAccount {
                address: alice.address,
                balance: 5_000,
            }],
            validators: vec![validator.address],
        },
    )
    .unwrap();

    let mempool = Arc::new(Mempool::new(MempoolConfig::default()));
    let checkpoints = Arc::new(CheckpointManager::new(
        CheckpointConfig::default(),
        Some(Arc::new(KeyPair::generate())),
    ));
    let builder = BlockBuilder::new(Arc::clone(&store), Arc::clone(&mempool), BlockConfig::default());
    let applier = BlockApplier::new(Arc::clone(&store), Arc::clone(&mempool), checkpoints);

    mempool
        .add(transfer(&alice, Address::from_bytes([0xB0; 32]), 1_000, 50, 0))
        .unwrap();
    let block = builder.build_block(validator.address, 1_000).unwrap();
    applier.apply_block(&block, None, 1_000).unwrap();

    // An unregistered producer is rejected while the registry is populated.
    let rogue = KeyPair::generate();
    let bad = builder.build_block(rogue.address, 1_001).unwrap();
    assert!(matches!(
        applier.apply_block(&bad, None, 1_001),
        Err(CoinjectureError::UnknownValidator(_))
    ));

    let record = store.get_validator(&validator.address).unwrap().unwrap();
    assert_eq!(record.blocks_produced, 1);
    let _ = std::fs::remove_dir_all(&data_dir);
}

#[test]
fn gossiped_block_replays_on_a_second_node() {
    let c1 = chain("wire-a");
    let c2 = chain("wire-b");
    let alice = KeyPair::generate();
    let bob = Address::from_bytes([0xB0; 32]);
    c1.store.create_account(alice.address, 1_000, 0).unwrap();
    c2.store.create_account(alice.address, 1_000, 0).unwrap();

    c1.mempool.add(transfer(&alice, bob, 100, 10, 0)).unwrap();
    let block = c1.builder.build_block(c1.validator, 1_000).unwrap();
    let hash = c1.applier.apply_block(&block, None, 1_000).unwrap();

    // Over the wire as JSON, then into the second node's applier.
    let hashes: Vec<_> = block.transactions.iter().map(tx_hash).collect();
    let message = BlockMessage::from_block(&block, hash, &hashes);
    let decoded = BlockMessage::from_bytes(&message.to_bytes()).unwrap();
    let (replayed, claimed) = decoded.to_block().unwrap();
    c2.applier.apply_block(&replayed, Some(claimed), 1_000).unwrap();

    // Identical inputs, identical state roots.
    let s1 = c1.store.get_block_by_number(1).unwrap().unwrap();
    let s2 = c2.store.get_block_by_number(1).unwrap().unwrap();
    assert_eq!(s1.header.state_root, s2.header.state_root);
    assert_eq!(s1.block_hash, s2.block_hash);
    assert_eq!(
        c2.store.get_account(&bob).unwrap().unwrap().balance,
        100
    );
}

#[test]
fn tampered_block_rejected_by_receiver() {
    let c1 = chain("tamper-a");
    let c2 = chain("tamper-b");
    let alice = KeyPair::generate();
    c1.store.create_account(alice.address, 1_000, 0).unwrap();
    c2.store.create_account(alice.address, 1_000, 0).unwrap();

    c1.mempool
        .add(transfer(&alice, Address::from_bytes([0xB0; 32]), 100, 10, 0))
        .unwrap();
    let block = c1.builder.build_block(c1.validator, 1_000).unwrap();
    let hash = c1.applier.apply_block(&block, None, 1_000).unwrap();

    let hashes: Vec<_> = block.transactions.iter().map(tx_hash).collect();
    let mut message = BlockMessage::from_block(&block, hash, &hashes);
    message.transactions[0].amount += 1;

    let (tampered, claimed) = message.to_block().unwrap();
    assert!(c2.applier.apply_block(&tampered, Some(claimed), 1_000).is_err());
    assert_eq!(c2.store.chain_state().unwrap().head_block_number, 0);
}
