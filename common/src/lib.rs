//! Shared kernel for the spread monitor.
//!
//! Domain types exchanged between the ingestion pipeline and the signal
//! crate, the typed error taxonomy, and application configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, PredictionConfig, PublisherConfig, QueueConfig, StorageConfig, StreamConfig,
    VenueConfig,
};
pub use error::{MonitorError, SignalError};
pub use types::{
    ArbitrageOpportunity, BacktestSummary, Candle, FeeBreakdown, FeeSchedule, FeatureVector,
    IndicatorSnapshot, Prediction, PublishedEvent, TradeUpdate, MODEL_VERSION,
};

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
