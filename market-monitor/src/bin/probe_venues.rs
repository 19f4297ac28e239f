use common::config::load_config;
use common::QueueConfig;
use market_monitor::connectors::{
    BinanceClient, CandleSource, DexPriceSource, OrderBookDexClient, TradeStream,
};
use market_monitor::UpdateQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt;

/// Connectivity check against both venues: streams trades for one symbol,
/// pulls recent candles and reads the DEX midpoint.
///
/// Run with: cargo run --bin probe_venues -- BTCUSDC [config.toml]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_max_level(tracing::Level::INFO).init();

    let mut args = std::env::args().skip(1);
    let symbol = args.next().unwrap_or_else(|| "BTCUSDC".to_string());
    let config = load_config(args.next().as_deref())?;

    info!("Probing venues for {}...", symbol);

    let client = BinanceClient::new(&config.venues, &config.stream, None)?;

    match client.fetch_candles(&symbol, &config.prediction.interval, 5).await {
        Ok(candles) => {
            info!("✅ Fetched {} candles", candles.len());
            for candle in &candles {
                info!(
                    "  → t={} o={:.4} h={:.4} l={:.4} c={:.4} v={:.2}",
                    candle.timestamp, candle.open, candle.high, candle.low, candle.close, candle.volume
                );
            }
        }
        Err(e) => error!("Candle fetch failed: {}", e),
    }

    let dex = OrderBookDexClient::new(&config.venues)?;
    match dex.book_top(&symbol).await {
        Ok(top) => info!(
            "✅ DEX book: bid {:?} ask {:?} mid {:.4}",
            top.best_bid,
            top.best_ask,
            top.midpoint()
        ),
        Err(e) => warn!("DEX lookup failed: {}", e),
    }

    // Collect trades into a queue without draining it
    let queue = Arc::new(UpdateQueue::new(QueueConfig::default()));
    info!("Listening for trades (will run for 30 seconds)...");
    let subscription = client.subscribe(&symbol, queue.clone()).await?;

    tokio::time::sleep(Duration::from_secs(30)).await;
    subscription.close();

    info!("Test complete. Received {} trades in 30 seconds.", queue.len());
    Ok(())
}
