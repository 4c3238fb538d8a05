//! Per-peer reputation. A leaf subsystem: it records observations and
//! answers queries, and never calls out into the rest of the stack.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use libp2p::PeerId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use coinjecture_core::constants::{
    SCORE_INVALID_MESSAGE, SCORE_MALFORMED, SCORE_TIMEOUT, SCORE_VALID_MESSAGE,
};

use crate::config::ScoringConfig;

/// Reputation record for one observed peer.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub score: i32,
    pub quarantined: bool,
    pub banned: bool,
    pub last_seen: Instant,
    pub valid_count: u64,
    pub invalid_count: u64,
}

/// Score table with quarantine/ban thresholds and decay-toward-initial.
pub struct PeerScoreTable {
    config: ScoringConfig,
    inner: Mutex<HashMap<PeerId, PeerRecord>>,
}

impl PeerScoreTable {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn adjust(&self, peer: &PeerId, delta: i32, invalid: bool) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let record = inner.entry(*peer).or_insert_with(|| PeerRecord {
            peer_id: *peer,
            score: self.config.initial_score,
            quarantined: false,
            banned: false,
            last_seen: Instant::now(),
            valid_count: 0,
            invalid_count: 0,
        });
        record.score = record.score.saturating_add(delta).min(self.config.initial_score);
        record.last_seen = Instant::now();
        if invalid {
            record.invalid_count += 1;
        } else if delta > 0 {
            record.valid_count += 1;
        }

        let was_banned = record.banned;
        record.quarantined = record.score < self.config.quarantine_threshold;
        record.banned = record.score <= self.config.ban_threshold;
        if record.banned && !was_banned {
            warn!(peer = %peer, score = record.score, "peer banned");
        }
    }

    pub fn record_valid(&self, peer: &PeerId) {
        self.adjust(peer, SCORE_VALID_MESSAGE, false);
    }

    /// Well-formed but rejected content (bad signature, rejected tx/block).
    pub fn record_invalid(&self, peer: &PeerId) {
        self.adjust(peer, SCORE_INVALID_MESSAGE, true);
    }

    pub fn record_timeout(&self, peer: &PeerId) {
        self.adjust(peer, SCORE_TIMEOUT, true);
    }

    /// Undecodable bytes.
    pub fn record_malformed(&self, peer: &PeerId) {
        self.adjust(peer, SCORE_MALFORMED, true);
    }

    pub fn score(&self, peer: &PeerId) -> Option<i32> {
        self.inner.lock().ok()?.get(peer).map(|r| r.score)
    }

    pub fn is_banned(&self, peer: &PeerId) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.get(peer).map(|r| r.banned).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn is_quarantined(&self, peer: &PeerId) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.get(peer).map(|r| r.quarantined).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn get(&self, peer: &PeerId) -> Option<PeerRecord> {
        self.inner.lock().ok()?.get(peer).cloned()
    }

    /// Every score below the initial value recovers by one point; bans and
    /// quarantines lift automatically once the thresholds are recrossed.
    pub fn decay(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        for record in inner.values_mut() {
            if record.score < self.config.initial_score {
                record.score += 1;
                let was_banned = record.banned;
                record.quarantined = record.score < self.config.quarantine_threshold;
                record.banned = record.score <= self.config.ban_threshold;
                if was_banned && !record.banned {
                    info!(peer = %record.peer_id, score = record.score, "peer ban lifted");
                }
            }
        }
    }

    /// Drop peers with no activity inside the stale window.
    pub fn evict_stale(&self) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        let before = inner.len();
        let stale = self.config.stale_timeout;
        inner.retain(|_, r| r.last_seen.elapsed() <= stale);
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Background maintenance: decay and stale eviction on the decay interval.
pub fn spawn_maintenance(
    table: Arc<PeerScoreTable>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = table.config.decay_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    table.decay();
                    let evicted = table.evict_stale();
                    if evicted > 0 {
                        debug!(evicted, "evicted stale peers");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table() -> PeerScoreTable {
        PeerScoreTable::new(ScoringConfig::default())
    }

    #[test]
    fn scores_start_at_initial() {
        let t = table();
        let peer = PeerId::random();
        t.record_valid(&peer);
        // +1 clamps back to the initial ceiling.
        assert_eq!(t.score(&peer), Some(100));
    }

    #[test]
    fn ten_invalid_messages_ban() {
        let t = table();
        let peer = PeerId::random();
        for _ in 0..10 {
            t.record_invalid(&peer);
        }
        assert_eq!(t.score(&peer), Some(0));
        assert!(t.is_banned(&peer));
        assert_eq!(t.get(&peer).unwrap().invalid_count, 10);
    }

    #[test]
    fn quarantine_below_threshold() {
        let t = table();
        let peer = PeerId::random();
        // 100 - 9*10 = 10: at threshold, not yet quarantined.
        for _ in 0..9 {
            t.record_invalid(&peer);
        }
        assert!(!t.is_quarantined(&peer));
        t.record_timeout(&peer); // 5 < 10
        assert!(t.is_quarantined(&peer));
        assert!(!t.is_banned(&peer));
    }

    #[test]
    fn decay_lifts_ban() {
        let t = table();
        let peer = PeerId::random();
        for _ in 0..10 {
            t.record_invalid(&peer);
        }
        assert!(t.is_banned(&peer));
        t.decay();
        assert_eq!(t.score(&peer), Some(1));
        assert!(!t.is_banned(&peer));
        assert!(t.is_quarantined(&peer));
    }

    #[test]
    fn decay_caps_at_initial() {
        let t = table();
        let peer = PeerId::random();
        t.record_invalid(&peer); // 90
        for _ in 0..20 {
            t.decay();
        }
        assert_eq!(t.score(&peer), Some(100));
    }

    #[test]
    fn malformed_hits_harder() {
        let t = table();
        let peer = PeerId::random();
        t.record_malformed(&peer);
        assert_eq!(t.score(&peer), Some(80));
    }

    #[test]
    fn stale_peers_evicted() {
        let t = PeerScoreTable::new(ScoringConfig {
            stale_timeout: Duration::from_millis(0),
            ..ScoringConfig::default()
        });
        let peer = PeerId::random();
        t.record_valid(&peer);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(t.evict_stale(), 1);
        assert!(t.is_empty());
    }
}
