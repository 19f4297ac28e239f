//! Update Queue
//!
//! FIFO buffer between the trade streams and the spread evaluation. A single
//! drain loop takes up to `batch_size` updates at a time, pauses after every
//! item and again after every batch, so DEX requests stay paced no matter how
//! fast trades arrive.

use crate::shutdown::Shutdown;
use async_trait::async_trait;
use common::{MonitorError, QueueConfig, TradeUpdate};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Handles one dequeued trade
#[async_trait]
pub trait TradeProcessor: Send + Sync {
    async fn process(&self, update: TradeUpdate) -> Result<(), MonitorError>;
}

pub struct UpdateQueue {
    pending: Mutex<VecDeque<TradeUpdate>>,
    notify: Notify,
    consumer_active: AtomicBool,
    draining: AtomicBool,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    config: QueueConfig,
}

impl UpdateQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            consumer_active: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    /// Append an update and wake the drain loop. With `max_pending` set, the
    /// oldest pending update is discarded once the queue is full.
    pub fn add(&self, update: TradeUpdate) {
        {
            let mut pending = self.pending.lock();
            if let Some(max) = self.config.max_pending {
                while pending.len() >= max.max(1) {
                    if let Some(stale) = pending.pop_front() {
                        warn!("Update queue full, dropping oldest update for {}", stale.symbol);
                    }
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            pending.push_back(update);
        }
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// True while a batch is in flight
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn take_batch(&self) -> Vec<TradeUpdate> {
        let mut pending = self.pending.lock();
        let n = self.config.batch_size.max(1).min(pending.len());
        pending.drain(..n).collect()
    }

    /// Drain loop. Runs until shutdown; pending updates are abandoned then.
    /// Only one drain loop may run at a time; a second call returns at once.
    pub async fn run(&self, processor: Arc<dyn TradeProcessor>, mut shutdown: Shutdown) {
        if self
            .consumer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("Update queue already has a consumer, not starting another");
            return;
        }

        info!(
            "Update queue started (batch size {}, item delay {:?}, batch interval {:?})",
            self.config.batch_size,
            self.config.item_delay(),
            self.config.batch_interval()
        );

        loop {
            let batch = self.take_batch();

            if batch.is_empty() {
                self.draining.store(false, Ordering::Release);
                tokio::select! {
                    _ = self.notify.notified() => continue,
                    _ = shutdown.wait() => break,
                }
            }

            self.draining.store(true, Ordering::Release);
            debug!("Processing batch of {} update(s)", batch.len());

            for update in batch {
                let symbol = update.symbol.clone();
                match processor.process(update).await {
                    Ok(()) => {
                        self.processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        if e.is_rate_limited() {
                            warn!("Rate limited while processing {}: {}", symbol, e);
                        } else {
                            error!("Failed to process update for {}: {}", symbol, e);
                        }
                    }
                }

                if !pause(self.config.item_delay(), &mut shutdown).await {
                    return self.stop();
                }
            }

            if !pause(self.config.batch_interval(), &mut shutdown).await {
                return self.stop();
            }
        }

        self.stop();
    }

    fn stop(&self) {
        self.draining.store(false, Ordering::Release);
        self.consumer_active.store(false, Ordering::Release);
        let abandoned = self.len();
        if abandoned > 0 {
            warn!("Update queue stopped with {} pending update(s)", abandoned);
        } else {
            info!("Update queue stopped");
        }
    }
}

/// Sleep unless shutdown fires first; false means stop.
async fn pause(duration: Duration, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.wait() => false,
    }
}
