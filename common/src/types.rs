use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version tag stamped on every prediction.
pub const MODEL_VERSION: &str = "1.0.0";

/// A single trade print from the centralized venue's stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeUpdate {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}

/// OHLCV candle. `timestamp` is the open time in milliseconds since epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Raw technical indicators computed over one feature window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub returns: f64,
    pub volatility: f64,
    pub ma7: f64,
    pub ma25: f64,
    pub rsi: f64,
}

/// Normalized feature row produced from a 26-candle trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub timestamp: i64,
    pub close: f64,
    pub normalized_returns: f64,
    pub normalized_volatility: f64,
    pub normalized_ma7: f64,
    pub normalized_ma25: f64,
    pub normalized_rsi: f64,
    /// 1.0 when the next close is higher, 0.0 otherwise; `None` for the
    /// most recent point.
    pub target: Option<f64>,
    pub raw: IndicatorSnapshot,
}

impl FeatureVector {
    pub const NUM_FEATURES: usize = 5;

    /// Model input in fixed order: returns, volatility, ma7, ma25, rsi.
    pub fn features(&self) -> [f64; Self::NUM_FEATURES] {
        [
            self.normalized_returns,
            self.normalized_volatility,
            self.normalized_ma7,
            self.normalized_ma25,
            self.normalized_rsi,
        ]
    }
}

/// Fee rates as fractions (0.001 = 0.1%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub venue_a: f64,
    pub venue_b: f64,
    pub network: f64,
}

impl FeeSchedule {
    pub fn total(&self) -> f64 {
        self.venue_a + self.venue_b + self.network
    }

    pub fn zero() -> Self {
        Self {
            venue_a: 0.0,
            venue_b: 0.0,
            network: 0.0,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            venue_a: 0.001,   // CEX taker
            venue_b: 0.003,   // DEX taker
            network: 0.000005,
        }
    }
}

/// Fees expressed in percent, attached to each opportunity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub venue_a: f64,
    pub venue_b: f64,
    pub network: f64,
}

impl From<&FeeSchedule> for FeeBreakdown {
    fn from(fees: &FeeSchedule) -> Self {
        Self {
            venue_a: fees.venue_a * 100.0,
            venue_b: fees.venue_b * 100.0,
            network: fees.network * 100.0,
        }
    }
}

/// Fee-adjusted spread between the two venues for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageOpportunity {
    pub symbol: String,
    pub venue_a_price: f64,
    pub venue_b_price: f64,
    pub profit_percentage: f64,
    pub estimated_profit: f64,
    pub is_profitable: bool,
    pub fee_breakdown: FeeBreakdown,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub accuracy: f64,
    pub pnl: f64,
}

/// Direction forecast for one symbol at one scheduler cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub predicted_direction: bool,
    pub confidence: f64,
    pub current_price: f64,
    pub metrics: IndicatorSnapshot,
    pub model_version: String,
    /// Filled in by reconciliation once the next candle closes.
    pub actual_direction: Option<bool>,
    pub backtest: Option<BacktestSummary>,
}

impl Prediction {
    pub fn from_latest(symbol: &str, latest: &FeatureVector, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            predicted_direction: confidence > 0.5,
            confidence,
            current_price: latest.close,
            metrics: latest.raw,
            model_version: MODEL_VERSION.to_string(),
            actual_direction: None,
            backtest: None,
        }
    }
}

/// Messages fanned out to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishedEvent {
    ArbitrageOpportunity(ArbitrageOpportunity),
    NewPrediction(Prediction),
}

impl PublishedEvent {
    pub fn symbol(&self) -> &str {
        match self {
            PublishedEvent::ArbitrageOpportunity(opp) => &opp.symbol,
            PublishedEvent::NewPrediction(prediction) => &prediction.symbol,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            PublishedEvent::ArbitrageOpportunity(_) => "ARBITRAGE_OPPORTUNITY",
            PublishedEvent::NewPrediction(_) => "NEW_PREDICTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_opportunity() -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            symbol: "BTCUSDC".to_string(),
            venue_a_price: 101.0,
            venue_b_price: 100.0,
            profit_percentage: 0.5995,
            estimated_profit: 0.5995,
            is_profitable: true,
            fee_breakdown: FeeBreakdown::from(&FeeSchedule::default()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let event = PublishedEvent::ArbitrageOpportunity(sample_opportunity());
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "ARBITRAGE_OPPORTUNITY");
        assert_eq!(json["data"]["venueAPrice"], 101.0);
        assert_eq!(json["data"]["isProfitable"], true);
        let dex_fee = json["data"]["feeBreakdown"]["venueB"].as_f64().unwrap();
        assert!((dex_fee - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_event_type() {
        let latest = FeatureVector {
            timestamp: 0,
            close: 42.0,
            normalized_returns: 0.5,
            normalized_volatility: 0.1,
            normalized_ma7: 0.5,
            normalized_ma25: 0.5,
            normalized_rsi: 0.5,
            target: None,
            raw: IndicatorSnapshot::default(),
        };
        let prediction = Prediction::from_latest("ETHUSDC", &latest, 0.73);
        assert!(prediction.predicted_direction);
        assert_eq!(prediction.model_version, MODEL_VERSION);

        let event = PublishedEvent::NewPrediction(prediction);
        assert_eq!(event.symbol(), "ETHUSDC");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"NEW_PREDICTION\""));
        assert!(json.contains("\"currentPrice\":42.0"));
    }

    #[test]
    fn test_default_fees_total() {
        let fees = FeeSchedule::default();
        assert!((fees.total() - 0.004005).abs() < 1e-12);
    }
}
