// Signal Generation
// Pure computations behind the monitor: spread evaluation, feature engineering
// and the direction classifier

pub mod arbitrage;
pub mod backtest;
pub mod features;
pub mod model;
mod network;

pub use arbitrage::{evaluate, ArbitrageEvaluator};
pub use backtest::{BacktestPoint, BacktestReport};
pub use features::{feature_matrix, normalize, prepare_training_data, WINDOW};
pub use model::{DirectionModel, Features, ModelConfig, TrainingSummary};
