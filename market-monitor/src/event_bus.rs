use anyhow::Result;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio::sync::broadcast;
use tracing::{debug, error};

use common::PublishedEvent;
use std::sync::Arc;
use std::time::Duration;

/// Outbound boundary for opportunity and prediction events. Delivery is
/// best-effort: no acknowledgement and no replay.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &PublishedEvent) -> Result<()>;
}

/// In-process fan-out to the WebSocket server's connected clients
pub struct BroadcastPublisher {
    tx: broadcast::Sender<PublishedEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<()> {
        // No connected subscriber is not an error
        match self.tx.send(event.clone()) {
            Ok(n) => debug!("Broadcast {} to {} subscriber(s)", event.event_type(), n),
            Err(_) => debug!("No subscribers for {}", event.event_type()),
        }
        Ok(())
    }
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<()> {
        let key = event.symbol().to_string();
        let value = serde_json::to_string(event)?;

        debug!("Publishing {} to {}", event.event_type(), self.topic);

        self.producer
            .send(
                FutureRecord::to(&self.topic).key(&key).payload(&value),
                Timeout::After(Duration::from_secs(5)),
            )
            .await
            .map_err(|(e, _)| {
                error!("Failed to publish to {}: {}", self.topic, e);
                anyhow::anyhow!("Failed to publish message: {}", e)
            })?;

        Ok(())
    }
}

/// Publishes to every inner publisher; one failing target does not stop the rest
#[derive(Default)]
pub struct FanoutPublisher {
    targets: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn EventPublisher>) -> Self {
        self.targets.push(target);
        self
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: &PublishedEvent) -> Result<()> {
        let mut failures = 0;
        for target in &self.targets {
            if let Err(e) = target.publish(event).await {
                error!("Publisher failed for {}: {}", event.event_type(), e);
                failures += 1;
            }
        }

        if failures > 0 && failures == self.targets.len() {
            anyhow::bail!("all {} publisher(s) failed", failures);
        }
        Ok(())
    }
}
