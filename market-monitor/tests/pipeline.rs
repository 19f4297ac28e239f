use async_trait::async_trait;
use common::{Candle, FeeSchedule, MonitorError, QueueConfig, StreamConfig, TradeUpdate};
use market_monitor::connectors::{BookTop, CandleSource, ClientPool, DexPriceSource, Subscription, TradeStream};
use market_monitor::databases::InMemorySink;
use market_monitor::event_bus::BroadcastPublisher;
use market_monitor::scheduler::{ModelRegistry, PredictionScheduler};
use market_monitor::{shutdown, ArbitrageProcessor, StreamSupervisor, UpdateQueue};
use parking_lot::Mutex;
use signal_generation::{ArbitrageEvaluator, ModelConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Records subscribe times and emits one trade for `trade_symbol`
struct FakeStream {
    trade_symbol: String,
    trade_price: f64,
    subscribed: Mutex<Vec<(String, Instant)>>,
}

#[async_trait]
impl TradeStream for FakeStream {
    async fn subscribe(
        &self,
        symbol: &str,
        queue: Arc<UpdateQueue>,
    ) -> Result<Subscription, MonitorError> {
        self.subscribed.lock().push((symbol.to_string(), Instant::now()));
        if symbol == self.trade_symbol {
            queue.add(TradeUpdate::new(symbol, self.trade_price));
        }
        Ok(Subscription::new(symbol, tokio::spawn(std::future::pending())))
    }
}

struct FixedDex(f64);

#[async_trait]
impl DexPriceSource for FixedDex {
    async fn book_top(&self, _symbol: &str) -> Result<BookTop, MonitorError> {
        Ok(BookTop {
            best_bid: Some(self.0),
            best_ask: Some(self.0),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn profitable_trade_is_persisted_and_published_once() {
    let symbols: Vec<String> = ["BTCUSDC", "ETHUSDC", "SOLUSDC"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let stream = Arc::new(FakeStream {
        trade_symbol: "BTCUSDC".to_string(),
        trade_price: 101.0,
        subscribed: Mutex::new(Vec::new()),
    });
    let sink = Arc::new(InMemorySink::new());
    let publisher = Arc::new(BroadcastPublisher::new(16));
    let mut events = publisher.subscribe();
    let (trigger, shutdown) = shutdown::channel();

    let queue = Arc::new(UpdateQueue::new(QueueConfig::default()));
    let processor = Arc::new(ArbitrageProcessor::new(
        Arc::new(FixedDex(100.0)),
        ArbitrageEvaluator::new(FeeSchedule::default()),
        sink.clone(),
        publisher.clone(),
        Duration::from_secs(60),
    ));

    let client: Arc<dyn TradeStream> = stream.clone();
    let supervisor = Arc::new(StreamSupervisor::new(
        ClientPool::single(client),
        queue.clone(),
        StreamConfig::default(),
        shutdown.clone(),
    ));

    let start = Instant::now();
    let consumer = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { queue.run(processor, shutdown).await })
    };
    let supervision = tokio::spawn(supervisor.run(symbols.clone()));

    tokio::time::sleep(Duration::from_secs(60)).await;
    trigger.trigger();
    consumer.await.unwrap();
    supervision.await.unwrap();

    let subscribed = stream.subscribed.lock().clone();
    let order: Vec<&str> = subscribed.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(order, vec!["BTCUSDC", "ETHUSDC", "SOLUSDC"]);
    let offsets: Vec<Duration> = subscribed.iter().map(|(_, at)| *at - start).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(15)
        ]
    );

    let stored = sink.opportunities().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].symbol, "BTCUSDC");
    assert!(stored[0].is_profitable);
    assert!((stored[0].profit_percentage - 0.5995).abs() < 1e-9);

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type(), "ARBITRAGE_OPPORTUNITY");
    assert!(events.try_recv().is_err());
    assert_eq!(queue.processed_count(), 1);
}

/// Deterministic hourly candles; symbols listed in `failing` error out
struct FakeCandles {
    failing: Vec<String>,
    fail_first: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeCandles {
    fn new() -> Self {
        Self {
            failing: vec!["BADUSDC".to_string()],
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CandleSource for FakeCandles {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|s| s == symbol) {
            return Err(MonitorError::Upstream(format!("no history for {}", symbol)));
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MonitorError::Upstream("temporarily unavailable".to_string()));
        }

        Ok((0..limit)
            .map(|i| {
                let t = i as f64;
                let close = 100.0 + 5.0 * (t / 6.0).sin() + 0.01 * t;
                Candle {
                    timestamp: 1_700_000_000_000 + i as i64 * 3_600_000,
                    open: close - 0.1,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 10.0,
                }
            })
            .collect())
    }
}

fn scheduler(
    source: Arc<FakeCandles>,
    symbols: &[&str],
) -> (PredictionScheduler, Arc<InMemorySink>, Arc<BroadcastPublisher>) {
    let sink = Arc::new(InMemorySink::new());
    let publisher = Arc::new(BroadcastPublisher::new(16));
    let candles: Arc<dyn CandleSource> = source;

    let scheduler = PredictionScheduler::new(
        ClientPool::single(candles),
        Arc::new(ModelRegistry::new()),
        sink.clone(),
        publisher.clone(),
        common::PredictionConfig::default(),
        symbols.iter().map(|s| s.to_string()).collect(),
    )
    .with_model_config(ModelConfig {
        epochs: 2,
        seed: Some(11),
        ..ModelConfig::default()
    });

    (scheduler, sink, publisher)
}

#[tokio::test]
async fn concurrent_training_requests_train_once() {
    let source = Arc::new(FakeCandles::new());
    let (scheduler, _, _) = scheduler(source.clone(), &["BTCUSDC"]);

    let (a, b) = tokio::join!(
        scheduler.train_model("BTCUSDC"),
        scheduler.train_model("BTCUSDC")
    );

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.registry().trained_symbols(), vec!["BTCUSDC".to_string()]);
}

#[tokio::test]
async fn failing_symbol_is_skipped_for_the_cycle() {
    let source = Arc::new(FakeCandles::new());
    let (scheduler, sink, publisher) = scheduler(source, &["BADUSDC", "BTCUSDC"]);
    let mut events = publisher.subscribe();

    scheduler.train_model("BTCUSDC").await.unwrap();
    assert!(scheduler.train_model("BADUSDC").await.is_err());
    assert!(!scheduler.registry().is_trained("BADUSDC"));

    assert_eq!(scheduler.run_cycle().await, 1);

    let predictions = sink.predictions().await;
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].symbol, "BTCUSDC");
    assert_eq!(predictions[0].model_version, "1.0.0");
    assert!((0.0..=1.0).contains(&predictions[0].confidence));
    assert_eq!(predictions[0].predicted_direction, predictions[0].confidence > 0.5);

    let replay = predictions[0].backtest.expect("trained model carries a backtest");
    assert_eq!(scheduler.backtest_summary("BTCUSDC"), Some(replay));
    assert!((0.0..=100.0).contains(&replay.accuracy));
    assert!(scheduler.backtest_summary("BADUSDC").is_none());

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type(), "NEW_PREDICTION");
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["data"]["backtest"]["accuracy"], replay.accuracy);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn backtest_replays_training_window() {
    let source = Arc::new(FakeCandles::new());
    let (scheduler, _, _) = scheduler(source, &["ETHUSDC"]);

    let report = scheduler.backtest("ETHUSDC").await.unwrap();

    // 1000 candles -> 975 feature rows, the last one unlabeled
    assert_eq!(report.total_trades, 974);
    assert_eq!(report.predictions.len(), 974);
}

#[tokio::test(start_paused = true)]
async fn warm_up_retries_failed_training() {
    let source = Arc::new(FakeCandles::new());
    source.fail_first.store(1, Ordering::SeqCst);
    let (scheduler, _, _) = scheduler(source.clone(), &["SOLUSDC"]);
    let (_trigger, mut shutdown) = shutdown::channel();

    let start = Instant::now();
    assert!(scheduler.warm_up(&mut shutdown).await);

    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert!(scheduler.registry().is_trained("SOLUSDC"));
}
