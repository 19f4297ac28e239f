use thiserror::Error;

/// Failures from the pure signal computations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("insufficient data: need at least {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("no scoreable data: every point has a null target")]
    NoScoreableData,

    #[error("model not initialized")]
    ModelNotInitialized,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failures from venue I/O and the ingestion pipeline
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("rate limit hit for {symbol}: {message}")]
    RateLimited { symbol: String, message: String },

    #[error("no DEX market configured for {0}")]
    UnknownMarket(String),

    #[error("failed to subscribe to {symbol}: {reason}")]
    Subscribe { symbol: String, reason: String },

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl MonitorError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MonitorError::RateLimited { .. })
    }
}
