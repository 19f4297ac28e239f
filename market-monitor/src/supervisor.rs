//! Stream Supervisor
//!
//! Keeps one trade subscription alive per symbol. Startup is staggered so the
//! venue never sees a burst of handshakes; after a failed subscribe or a
//! dropped stream the symbol waits a fixed backoff and tries again, forever.

use crate::connectors::{ClientPool, TradeStream};
use crate::queue::UpdateQueue;
use crate::shutdown::Shutdown;
use common::StreamConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Subscribing,
    Streaming,
    Failed,
}

pub struct StreamSupervisor {
    clients: ClientPool<dyn TradeStream>,
    queue: Arc<UpdateQueue>,
    config: StreamConfig,
    states: DashMap<String, StreamState>,
    shutdown: Shutdown,
}

impl StreamSupervisor {
    pub fn new(
        clients: ClientPool<dyn TradeStream>,
        queue: Arc<UpdateQueue>,
        config: StreamConfig,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            clients,
            queue,
            config,
            states: DashMap::new(),
            shutdown,
        }
    }

    pub fn state(&self, symbol: &str) -> Option<StreamState> {
        self.states.get(symbol).map(|entry| *entry.value())
    }

    fn set_state(&self, symbol: &str, state: StreamState) {
        self.states.insert(symbol.to_string(), state);
    }

    /// Supervise every symbol until shutdown. Each symbol waits one stagger
    /// delay more than the previous before its first subscribe. A symbol is
    /// claimed once; repeats and symbols already under supervision are skipped.
    pub async fn run(self: Arc<Self>, symbols: Vec<String>) {
        let symbols = self.claim(symbols);

        let mut shutdown = self.shutdown.clone();
        let mut handles = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            tokio::select! {
                _ = tokio::time::sleep(self.config.stagger_delay()) => {}
                _ = shutdown.wait() => break,
            }
            handles.push(tokio::spawn(Arc::clone(&self).supervise(symbol)));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Stream supervisor task failed: {}", e);
            }
        }

        info!("Stream supervisor stopped");
    }

    fn claim(&self, symbols: Vec<String>) -> Vec<String> {
        let mut claimed = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.states.entry(symbol) {
                Entry::Vacant(slot) => {
                    claimed.push(slot.key().clone());
                    slot.insert(StreamState::Uninitialized);
                }
                Entry::Occupied(slot) => {
                    warn!("{} is already supervised, skipping", slot.key());
                }
            }
        }
        claimed
    }

    async fn supervise(self: Arc<Self>, symbol: String) {
        let mut shutdown = self.shutdown.clone();

        loop {
            self.set_state(&symbol, StreamState::Subscribing);
            let client = self.clients.next();

            let attempt = tokio::select! {
                result = client.subscribe(&symbol, Arc::clone(&self.queue)) => result,
                _ = shutdown.wait() => return,
            };

            match attempt {
                Ok(mut subscription) => {
                    self.set_state(&symbol, StreamState::Streaming);
                    info!("Stream initialized for {}", symbol);

                    tokio::select! {
                        _ = subscription.closed() => {
                            warn!("Stream for {} dropped", symbol);
                        }
                        _ = shutdown.wait() => {
                            subscription.close();
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to initialize stream for {}: {}", symbol, e);
                }
            }

            self.set_state(&symbol, StreamState::Failed);
            info!(
                "Retrying {} in {:?}",
                symbol,
                self.config.retry_backoff()
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_backoff()) => {}
                _ = shutdown.wait() => return,
            }
        }
    }
}
