use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use common::config::{create_config_template, load_config};
use market_monitor::connectors::{
    BinanceClient, CandleSource, ClientPool, DexPriceSource, OrderBookDexClient, TradeStream,
};
use market_monitor::databases::{InMemorySink, PersistenceSink, TimeSeriesDB};
use market_monitor::event_bus::{BroadcastPublisher, EventPublisher, FanoutPublisher, KafkaPublisher};
use market_monitor::{
    shutdown, ws_server, ArbitrageProcessor, ModelRegistry, PredictionScheduler, StreamSupervisor,
    UpdateQueue,
};
use signal_generation::ArbitrageEvaluator;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let first = args.next();
    if first.as_deref() == Some("init") {
        let path = args.next().unwrap_or_else(|| "monitor.toml".to_string());
        create_config_template(&path)?;
        println!("Wrote config template to {}", path);
        return Ok(());
    }

    let config_path = first.or_else(|| std::env::var("MONITOR_CONFIG").ok());
    let config = load_config(config_path.as_deref())?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    info!("🚀 Starting CEX/DEX spread monitor for {:?}", config.symbols);

    let sink: Arc<dyn PersistenceSink> = match &config.storage.database_url {
        Some(url) => {
            let db = TimeSeriesDB::new(url).await?;
            db.init_tables().await?;
            Arc::new(db)
        }
        None => {
            warn!("No database configured, keeping records in memory");
            Arc::new(InMemorySink::new())
        }
    };

    let broadcast = Arc::new(BroadcastPublisher::new(config.publisher.broadcast_capacity));
    let mut fanout = FanoutPublisher::new().with(broadcast.clone());
    if let Some(brokers) = &config.publisher.kafka_brokers {
        fanout = fanout.with(Arc::new(KafkaPublisher::new(brokers, &config.publisher.kafka_topic)?));
        info!("Publishing events to Kafka topic {}", config.publisher.kafka_topic);
    }
    let publisher: Arc<dyn EventPublisher> = Arc::new(fanout);

    let binance = BinanceClient::pool_from_config(&config.venues, &config.stream)?;
    let streams = ClientPool::new(
        binance
            .iter()
            .map(|client| Arc::clone(client) as Arc<dyn TradeStream>)
            .collect(),
    )?;
    let candles = ClientPool::new(
        binance
            .iter()
            .map(|client| Arc::clone(client) as Arc<dyn CandleSource>)
            .collect(),
    )?;
    info!("Binance client pool: {} client(s)", streams.len());

    for symbol in &config.symbols {
        if config.venues.market_address(symbol).is_none() {
            warn!("No DEX market address for {}, spreads will not be evaluated", symbol);
        }
    }
    let dex: Arc<dyn DexPriceSource> = Arc::new(OrderBookDexClient::new(&config.venues)?);

    let (trigger, shutdown) = shutdown::channel();
    let queue = Arc::new(UpdateQueue::new(config.queue.clone()));

    let processor = Arc::new(ArbitrageProcessor::new(
        dex,
        ArbitrageEvaluator::new(config.fees),
        sink.clone(),
        publisher.clone(),
        config.queue.rate_limit_cooldown(),
    ));

    let supervisor = Arc::new(StreamSupervisor::new(
        streams,
        queue.clone(),
        config.stream.clone(),
        shutdown.clone(),
    ));

    let scheduler = Arc::new(PredictionScheduler::new(
        candles,
        Arc::new(ModelRegistry::new()),
        sink,
        publisher,
        config.prediction.clone(),
        config.symbols.clone(),
    ));

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn({
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        async move { queue.run(processor, shutdown).await }
    }));

    tasks.push(tokio::spawn(supervisor.run(config.symbols.clone())));
    tasks.push(tokio::spawn(scheduler.run(shutdown.clone())));

    if let Some(addr) = config.publisher.ws_bind_addr.clone() {
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = ws_server::serve(&addr, broadcast, shutdown).await {
                error!("WebSocket server failed: {}", e);
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("👋 Shutting down gracefully...");
    trigger.trigger();

    let joined = tokio::time::timeout(SHUTDOWN_GRACE, async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;
    if joined.is_err() {
        warn!("Some tasks did not stop within {:?}", SHUTDOWN_GRACE);
    }

    info!(
        "Processed {} update(s), {} failed, {} dropped, {} left pending",
        queue.processed_count(),
        queue.failed_count(),
        queue.dropped_count(),
        queue.len()
    );

    Ok(())
}
