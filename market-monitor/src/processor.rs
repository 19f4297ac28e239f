use crate::connectors::DexPriceSource;
use crate::databases::PersistenceSink;
use crate::event_bus::EventPublisher;
use crate::queue::TradeProcessor;
use async_trait::async_trait;
use common::{MonitorError, PublishedEvent, TradeUpdate};
use signal_generation::ArbitrageEvaluator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Arbitrage path run for every dequeued trade: DEX midpoint, spread
/// evaluation, then persist and publish when the spread clears fees.
pub struct ArbitrageProcessor {
    dex: Arc<dyn DexPriceSource>,
    evaluator: ArbitrageEvaluator,
    sink: Arc<dyn PersistenceSink>,
    publisher: Arc<dyn EventPublisher>,
    rate_limit_cooldown: Duration,
}

impl ArbitrageProcessor {
    pub fn new(
        dex: Arc<dyn DexPriceSource>,
        evaluator: ArbitrageEvaluator,
        sink: Arc<dyn PersistenceSink>,
        publisher: Arc<dyn EventPublisher>,
        rate_limit_cooldown: Duration,
    ) -> Self {
        Self {
            dex,
            evaluator,
            sink,
            publisher,
            rate_limit_cooldown,
        }
    }
}

#[async_trait]
impl TradeProcessor for ArbitrageProcessor {
    async fn process(&self, update: TradeUpdate) -> Result<(), MonitorError> {
        if update.price <= 0.0 || !update.price.is_finite() {
            return Err(MonitorError::Upstream(format!(
                "invalid trade price {} for {}",
                update.price, update.symbol
            )));
        }

        let dex_price = match self.dex.mid_price(&update.symbol).await {
            Ok(price) => price,
            Err(e) if e.is_rate_limited() => {
                warn!(
                    "⏳ DEX rate limit for {}, cooling down for {:?}",
                    update.symbol, self.rate_limit_cooldown
                );
                tokio::time::sleep(self.rate_limit_cooldown).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if dex_price <= 0.0 {
            return Err(MonitorError::Upstream(format!(
                "empty DEX order book for {}",
                update.symbol
            )));
        }

        let opportunity = self.evaluator.evaluate(&update.symbol, update.price, dex_price);
        if !opportunity.is_profitable {
            debug!(
                "{}: cex={:.4} dex={:.4} spread {:.4}% below fees",
                update.symbol, update.price, dex_price, opportunity.profit_percentage
            );
            return Ok(());
        }

        self.sink
            .record_opportunity(&opportunity)
            .await
            .map_err(|e| MonitorError::Upstream(format!("persist opportunity: {}", e)))?;

        info!(
            "💰 {} spread {:.4}% (cex {:.4} / dex {:.4}, est. profit {:.4})",
            opportunity.symbol,
            opportunity.profit_percentage,
            opportunity.venue_a_price,
            opportunity.venue_b_price,
            opportunity.estimated_profit
        );

        let event = PublishedEvent::ArbitrageOpportunity(opportunity);
        if let Err(e) = self.publisher.publish(&event).await {
            warn!("Failed to publish {} for {}: {}", event.event_type(), event.symbol(), e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::BookTop;
    use crate::databases::InMemorySink;
    use crate::event_bus::BroadcastPublisher;
    use common::FeeSchedule;
    use tokio::time::Instant;

    struct FixedBook(Result<BookTop, ()>);

    #[async_trait]
    impl DexPriceSource for FixedBook {
        async fn book_top(&self, symbol: &str) -> Result<BookTop, MonitorError> {
            self.0.map_err(|_| MonitorError::RateLimited {
                symbol: symbol.to_string(),
                message: "Too many requests".to_string(),
            })
        }
    }

    fn book(mid: f64) -> FixedBook {
        FixedBook(Ok(BookTop {
            best_bid: Some(mid),
            best_ask: Some(mid),
        }))
    }

    fn processor(
        dex: FixedBook,
    ) -> (ArbitrageProcessor, Arc<InMemorySink>, Arc<BroadcastPublisher>) {
        let sink = Arc::new(InMemorySink::new());
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let processor = ArbitrageProcessor::new(
            Arc::new(dex),
            ArbitrageEvaluator::new(FeeSchedule::default()),
            sink.clone(),
            publisher.clone(),
            Duration::from_secs(60),
        );
        (processor, sink, publisher)
    }

    #[tokio::test]
    async fn test_profitable_spread_is_recorded_and_published() {
        let (processor, sink, publisher) = processor(book(100.0));
        let mut events = publisher.subscribe();

        processor.process(TradeUpdate::new("BTCUSDC", 101.0)).await.unwrap();

        let stored = sink.opportunities().await;
        assert_eq!(stored.len(), 1);
        assert!((stored[0].profit_percentage - 0.5995).abs() < 1e-9);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event_type(), "ARBITRAGE_OPPORTUNITY");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_thin_spread_is_ignored() {
        let (processor, sink, publisher) = processor(book(100.0));
        let mut events = publisher.subscribe();

        processor.process(TradeUpdate::new("BTCUSDC", 100.2)).await.unwrap();

        assert!(sink.opportunities().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_book_is_an_error() {
        let (processor, sink, _) = processor(FixedBook(Ok(BookTop::default())));
        let result = processor.process(TradeUpdate::new("BTCUSDC", 101.0)).await;

        assert!(matches!(result, Err(MonitorError::Upstream(_))));
        assert!(sink.opportunities().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_trade_price_is_an_error() {
        let (processor, sink, publisher) = processor(book(100.0));
        let mut events = publisher.subscribe();

        for price in [0.0, -1.0, f64::NAN] {
            let result = processor.process(TradeUpdate::new("BTCUSDC", price)).await;
            assert!(matches!(result, Err(MonitorError::Upstream(_))));
        }

        assert!(sink.opportunities().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_out_cooldown() {
        let (processor, _, _) = processor(FixedBook(Err(())));
        let start = Instant::now();

        let result = processor.process(TradeUpdate::new("BTCUSDC", 101.0)).await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }
}
