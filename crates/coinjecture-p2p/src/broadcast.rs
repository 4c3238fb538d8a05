//! Outbound batching for the transaction and content-ID topics.
//!
//! Items enqueue onto a bounded queue; a worker drains them into batches and
//! flushes either when a batch fills or on the periodic tick. Overflow drops
//! the new item with a warning — upstream re-enqueues on a later event.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coinjecture_core::error::CoinjectureError;

use crate::network::NetworkCommand;

/// Producer side of a broadcast queue.
#[derive(Clone)]
pub struct Broadcaster<T> {
    label: &'static str,
    queue: mpsc::Sender<T>,
}

impl<T> Broadcaster<T> {
    /// Non-blocking enqueue. A full queue refuses the newest item.
    pub fn enqueue(&self, item: T) -> Result<(), CoinjectureError> {
        self.queue.try_send(item).map_err(|e| {
            warn!(queue = self.label, "broadcast queue full, dropping item");
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    CoinjectureError::BroadcastQueueFull(self.label.into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    CoinjectureError::BroadcastQueueFull(format!("{} (closed)", self.label))
                }
            }
        })
    }
}

/// Spawn a batch worker: drains the queue into batches of up to `max_batch`,
/// flushing full batches immediately and partial batches every `interval`.
/// On shutdown the queue is drained once more before exit.
pub fn spawn_batcher<T: Send + 'static>(
    label: &'static str,
    capacity: usize,
    max_batch: usize,
    interval: Duration,
    commands: mpsc::Sender<NetworkCommand>,
    wrap: fn(Vec<T>) -> NetworkCommand,
    mut shutdown: watch::Receiver<bool>,
) -> (Broadcaster<T>, JoinHandle<()>) {
    let (queue_tx, mut queue_rx) = mpsc::channel::<T>(capacity);
    let handle = tokio::spawn(async move {
        let mut buffer: Vec<T> = Vec::with_capacity(max_batch);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                item = queue_rx.recv() => {
                    match item {
                        Some(item) => {
                            buffer.push(item);
                            if buffer.len() >= max_batch {
                                flush(label, &mut buffer, &commands, wrap).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        flush(label, &mut buffer, &commands, wrap).await;
                    }
                }
                _ = shutdown.changed() => {
                    // Drain whatever is already queued, then stop.
                    while let Ok(item) = queue_rx.try_recv() {
                        buffer.push(item);
                        if buffer.len() >= max_batch {
                            flush(label, &mut buffer, &commands, wrap).await;
                        }
                    }
                    if !buffer.is_empty() {
                        flush(label, &mut buffer, &commands, wrap).await;
                    }
                    debug!(queue = label, "batch worker stopping");
                    break;
                }
            }
        }
    });
    (
        Broadcaster {
            label,
            queue: queue_tx,
        },
        handle,
    )
}

async fn flush<T>(
    label: &'static str,
    buffer: &mut Vec<T>,
    commands: &mpsc::Sender<NetworkCommand>,
    wrap: fn(Vec<T>) -> NetworkCommand,
) {
    let batch = std::mem::take(buffer);
    debug!(queue = label, size = batch.len(), "flushing broadcast batch");
    if commands.send(wrap(batch)).await.is_err() {
        warn!(queue = label, "network command channel closed");
    }
}
