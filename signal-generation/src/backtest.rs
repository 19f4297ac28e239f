// Backtest results for the direction model

use common::BacktestSummary;
use serde::{Deserialize, Serialize};

/// One replayed historical point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestPoint {
    pub timestamp: i64,
    pub confidence: f64,
    pub predicted_direction: bool,
    pub actual_direction: bool,
    pub price: f64,
}

/// Hit-rate report over every labeled point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    /// Percentage of correct direction calls
    pub accuracy: f64,
    pub total_trades: usize,
    pub profitable_trades: usize,
    /// Sum of directional next-period returns, in percent
    pub pnl: f64,
    pub predictions: Vec<BacktestPoint>,
}

impl BacktestReport {
    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary {
            accuracy: self.accuracy,
            pnl: self.pnl,
        }
    }
}
