use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coinjecture_core::constants::{
    MEMPOOL_CLEANUP_INTERVAL_SECS, MEMPOOL_MAX_SIZE, MEMPOOL_MAX_TX_AGE_SECS,
};
use coinjecture_core::error::CoinjectureError;
use coinjecture_core::types::TxHash;
use coinjecture_core::Transaction;
use coinjecture_crypto::{tx_hash, verify_tx_signature};

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MempoolConfig {
    pub max_size: u32,
    pub max_tx_age: Duration,
    pub cleanup_interval: Duration,
    /// Transactions scoring below this at admission are refused outright.
    pub priority_threshold: f64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: MEMPOOL_MAX_SIZE,
            max_tx_age: Duration::from_secs(MEMPOOL_MAX_TX_AGE_SECS),
            cleanup_interval: Duration::from_secs(MEMPOOL_CLEANUP_INTERVAL_SECS),
            priority_threshold: 0.0,
        }
    }
}

// ── Pool ─────────────────────────────────────────────────────────────────────

struct PendingTx {
    tx: Transaction,
    added_at: Instant,
}

/// The bounded pending-transaction pool.
///
/// The internal lock covers map operations only and is never held across
/// I/O. `pop_best` is a selection, not a removal: rejected candidates stay
/// pooled until aging or an explicit `remove` (after block inclusion).
pub struct Mempool {
    config: MempoolConfig,
    inner: Mutex<HashMap<TxHash, PendingTx>>,
}

fn lock_err() -> CoinjectureError {
    CoinjectureError::Storage("mempool lock poisoned".into())
}

/// Priority: monotonic in fee-per-gas, inverse in age.
fn priority(tx: &Transaction, age: Duration, max_age: Duration) -> f64 {
    let fee_per_gas = tx.fee as f64 / tx.gas_limit.max(1) as f64;
    let age_factor = 1.0 + age.as_secs_f64() / max_age.as_secs_f64().max(1.0);
    fee_per_gas / age_factor
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a transaction: shape + signature + dedup + threshold + capacity.
    /// When full, the lowest-priority resident is evicted to make room — the
    /// newcomer is refused instead if it would itself be the lowest.
    pub fn add(&self, tx: Transaction) -> Result<TxHash, CoinjectureError> {
        tx.validate_shape()?;
        verify_tx_signature(&tx)?;
        let hash = tx_hash(&tx);

        let mut inner = self.inner.lock().map_err(|_| lock_err())?;
        if inner.contains_key(&hash) {
            return Err(CoinjectureError::DuplicateTransaction(hash.to_hex()));
        }

        let incoming = priority(&tx, Duration::ZERO, self.config.max_tx_age);
        if incoming < self.config.priority_threshold {
            return Err(CoinjectureError::BelowPriorityThreshold);
        }

        if inner.len() >= self.config.max_size as usize {
            let lowest = inner
                .iter()
                .map(|(h, p)| {
                    (
                        *h,
                        priority(&p.tx, p.added_at.elapsed(), self.config.max_tx_age),
                    )
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match lowest {
                Some((victim, score)) if score < incoming => {
                    inner.remove(&victim);
                    debug!(evicted = %victim, "mempool full, evicted lowest-priority tx");
                }
                _ => {
                    return Err(CoinjectureError::MempoolFull {
                        capacity: self.config.max_size,
                    });
                }
            }
        }

        inner.insert(
            hash,
            PendingTx {
                tx,
                added_at: Instant::now(),
            },
        );
        Ok(hash)
    }

    pub fn remove(&self, hash: &TxHash) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.remove(hash);
        }
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.contains_key(hash))
            .unwrap_or(false)
    }

    /// Up to `n` transactions by descending priority. Ties break by
    /// ascending `(sender, nonce)`, then ascending hash — so consecutive
    /// nonces from one sender come out in spendable order.
    pub fn pop_best(&self, n: usize) -> Vec<Transaction> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        let mut scored: Vec<(f64, TxHash, &PendingTx)> = inner
            .iter()
            .map(|(h, p)| {
                (
                    priority(&p.tx, p.added_at.elapsed(), self.config.max_tx_age),
                    *h,
                    p,
                )
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.2.tx.from.cmp(&b.2.tx.from))
                .then_with(|| a.2.tx.nonce.cmp(&b.2.tx.nonce))
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.into_iter().take(n).map(|(_, _, p)| p.tx.clone()).collect()
    }

    pub fn size(&self) -> u32 {
        self.inner.lock().map(|inner| inner.len() as u32).unwrap_or(0)
    }

    /// Drop transactions older than `max_tx_age`. Returns how many fell.
    pub fn purge_expired(&self) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        let before = inner.len();
        let max_age = self.config.max_tx_age;
        inner.retain(|_, p| p.added_at.elapsed() <= max_age);
        before - inner.len()
    }

    /// Empty the pool on shutdown.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clear();
        }
    }
}

// ── Janitor ──────────────────────────────────────────────────────────────────

/// Background housekeeping: every `cleanup_interval`, drop aged-out
/// transactions. Exits when the shutdown signal flips.
pub fn spawn_janitor(pool: Arc<Mempool>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let interval = pool.config.cleanup_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = pool.purge_expired();
                    if dropped > 0 {
                        warn!(dropped, "mempool janitor purged aged-out transactions");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("mempool janitor stopping");
                    break;
                }
            }
        }
    })
}
