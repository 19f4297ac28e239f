// Market Monitor
// Ingests CEX trades, compares them against DEX order-book midpoints and
// runs the per-symbol direction predictor on a fixed cadence

pub mod connectors;
pub mod databases;
pub mod event_bus;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod supervisor;
pub mod ws_server;

pub use connectors::{BookTop, CandleSource, ClientPool, DexPriceSource, Subscription, TradeStream};
pub use databases::{InMemorySink, PersistenceSink};
pub use event_bus::{BroadcastPublisher, EventPublisher, FanoutPublisher};
pub use processor::ArbitrageProcessor;
pub use queue::{TradeProcessor, UpdateQueue};
pub use scheduler::{ModelRegistry, PredictionScheduler};
pub use shutdown::Shutdown;
pub use supervisor::{StreamState, StreamSupervisor};
