//! Venue connectors
//!
//! The pipeline only sees the traits in this module; `binance` and `dex`
//! provide the network-backed implementations.

pub mod binance;
pub mod dex;

pub use binance::BinanceClient;
pub use dex::OrderBookDexClient;

use crate::queue::UpdateQueue;
use async_trait::async_trait;
use common::{Candle, MonitorError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Streaming trade feed of the centralized venue
#[async_trait]
pub trait TradeStream: Send + Sync {
    /// Open a trade subscription for `symbol`. Returns once the handshake
    /// succeeded; received trades are pushed onto `queue` from then on.
    async fn subscribe(
        &self,
        symbol: &str,
        queue: Arc<UpdateQueue>,
    ) -> Result<Subscription, MonitorError>;
}

/// Historical candle query of the centralized venue
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Ascending candles, at most `limit` of them
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MonitorError>;
}

/// Order-book snapshot of the decentralized venue
#[async_trait]
pub trait DexPriceSource: Send + Sync {
    async fn book_top(&self, symbol: &str) -> Result<BookTop, MonitorError>;

    async fn mid_price(&self, symbol: &str) -> Result<f64, MonitorError> {
        Ok(self.book_top(symbol).await?.midpoint())
    }
}

/// Best bid and ask of an order book
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookTop {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
}

impl BookTop {
    /// Midpoint with a missing side counted as 0
    pub fn midpoint(&self) -> f64 {
        (self.best_bid.unwrap_or(0.0) + self.best_ask.unwrap_or(0.0)) / 2.0
    }
}

/// Live trade subscription. Dropping it closes the underlying connection.
#[derive(Debug)]
pub struct Subscription {
    symbol: String,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap the task that reads the transport and feeds the queue
    pub fn new(symbol: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            symbol: symbol.into(),
            task,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Resolves when the stream ends on its own
    pub async fn closed(&mut self) {
        let _ = (&mut self.task).await;
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Round-robin pool of venue clients
pub struct ClientPool<T: ?Sized> {
    clients: Vec<Arc<T>>,
    cursor: AtomicUsize,
}

impl<T: ?Sized> ClientPool<T> {
    pub fn new(clients: Vec<Arc<T>>) -> Result<Self, MonitorError> {
        if clients.is_empty() {
            return Err(MonitorError::Config(
                "client pool needs at least one client".to_string(),
            ));
        }

        Ok(Self {
            clients,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn single(client: Arc<T>) -> Self {
        Self {
            clients: vec![client],
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next client in rotation
    pub fn next(&self) -> Arc<T> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        Arc::clone(&self.clients[idx])
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint() {
        let top = BookTop {
            best_bid: Some(99.0),
            best_ask: Some(101.0),
        };
        assert_eq!(top.midpoint(), 100.0);

        let one_sided = BookTop {
            best_bid: None,
            best_ask: Some(101.0),
        };
        assert_eq!(one_sided.midpoint(), 50.5);
        assert_eq!(BookTop::default().midpoint(), 0.0);
    }

    #[test]
    fn test_pool_rotates() {
        let pool = ClientPool::new(vec![Arc::new(1), Arc::new(2), Arc::new(3)]).unwrap();
        let picks: Vec<i32> = (0..5).map(|_| *pool.next()).collect();
        assert_eq!(picks, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(ClientPool::<i32>::new(Vec::new()).is_err());
        assert_eq!(ClientPool::single(Arc::new("only")).len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_reader() {
        let task = tokio::spawn(std::future::pending::<()>());
        let subscription = Subscription::new("BTCUSDC", task);
        assert_eq!(subscription.symbol(), "BTCUSDC");
        subscription.close();

        let mut subscription = subscription;
        subscription.closed().await;
    }
}
