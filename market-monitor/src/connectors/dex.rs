use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{BookTop, DexPriceSource};
use common::{MonitorError, VenueConfig};

const RATE_LIMIT_MARKER: &str = "too many requests";

/// Order-book depth endpoint of the DEX, keyed by market address.
///
/// The endpoint returns L2 levels as `{"bids": [[price, size, ...], ...],
/// "asks": [...]}`; only the price of each level is read.
pub struct OrderBookDexClient {
    http: reqwest::Client,
    base_url: String,
    markets: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    #[serde(default)]
    bids: Vec<Vec<f64>>,
    #[serde(default)]
    asks: Vec<Vec<f64>>,
}

impl OrderBookDexClient {
    pub fn new(venues: &VenueConfig) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(venues.request_timeout_secs))
            .build()
            .map_err(|e| MonitorError::Config(format!("http client: {}", e)))?;

        let markets = venues
            .markets
            .iter()
            .map(|(symbol, address)| (symbol.to_uppercase(), address.clone()))
            .collect();

        Ok(Self {
            http,
            base_url: venues.dex_orderbook_url.trim_end_matches('/').to_string(),
            markets,
        })
    }

    pub fn market_address(&self, symbol: &str) -> Option<&str> {
        self.markets.get(&symbol.to_uppercase()).map(String::as_str)
    }
}

#[async_trait]
impl DexPriceSource for OrderBookDexClient {
    async fn book_top(&self, symbol: &str) -> Result<BookTop, MonitorError> {
        let address = self
            .market_address(symbol)
            .ok_or_else(|| MonitorError::UnknownMarket(symbol.to_string()))?;
        let url = format!("{}/{}", self.base_url, address);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MonitorError::Upstream(format!("order book for {}: {}", symbol, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::Upstream(format!("order book body for {}: {}", symbol, e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || body.to_lowercase().contains(RATE_LIMIT_MARKER) {
            return Err(MonitorError::RateLimited {
                symbol: symbol.to_string(),
                message: format!("{}: {}", status, body.trim()),
            });
        }
        if !status.is_success() {
            return Err(MonitorError::Upstream(format!(
                "order book for {} returned {}",
                symbol, status
            )));
        }

        let top = parse_book_top(&body)?;
        debug!("{} book top: bid {:?} ask {:?}", symbol, top.best_bid, top.best_ask);
        Ok(top)
    }
}

fn parse_book_top(body: &str) -> Result<BookTop, MonitorError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| MonitorError::Upstream(format!("malformed order book: {}", e)))?;
    if !value.is_object() {
        return Err(MonitorError::Upstream(format!(
            "malformed order book: expected an object, got {}",
            body.trim()
        )));
    }
    let depth: DepthResponse = serde_json::from_value(value)
        .map_err(|e| MonitorError::Upstream(format!("malformed order book: {}", e)))?;

    let best_bid = depth
        .bids
        .iter()
        .filter_map(|level| level.first().copied())
        .reduce(f64::max);
    let best_ask = depth
        .asks
        .iter()
        .filter_map(|level| level.first().copied())
        .reduce(f64::min);

    Ok(BookTop { best_bid, best_ask })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_levels() {
        let body = r#"{
            "bids": [[99.5, 2.0], [99.9, 1.0], [98.0, 5.0]],
            "asks": [[100.4, 1.0], [100.1, 3.0]]
        }"#;
        let top = parse_book_top(body).unwrap();

        assert_eq!(top.best_bid, Some(99.9));
        assert_eq!(top.best_ask, Some(100.1));
        assert!((top.midpoint() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_side_counts_as_zero() {
        let top = parse_book_top(r#"{"bids": [], "asks": [[100.0, 1.0]]}"#).unwrap();
        assert_eq!(top.best_bid, None);
        assert_eq!(top.midpoint(), 50.0);

        let top = parse_book_top("{}").unwrap();
        assert_eq!(top, BookTop::default());
    }

    #[test]
    fn test_malformed_book() {
        assert!(parse_book_top("[]").is_err());
        assert!(parse_book_top("[[], []]").is_err());
        assert!(parse_book_top("null").is_err());
        assert!(parse_book_top(r#"{"bids": "none"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unknown_market() {
        let client = OrderBookDexClient::new(&VenueConfig::default()).unwrap();
        let err = client.book_top("BTCUSDC").await.unwrap_err();
        assert!(matches!(err, MonitorError::UnknownMarket(_)));
    }

    #[test]
    fn test_market_lookup_ignores_case() {
        let mut venues = VenueConfig::default();
        venues
            .markets
            .insert("solusdc".to_string(), "market-sol".to_string());
        let client = OrderBookDexClient::new(&venues).unwrap();

        assert_eq!(client.market_address("SOLUSDC"), Some("market-sol"));
    }
}
