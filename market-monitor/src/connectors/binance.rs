use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{CandleSource, Subscription, TradeStream};
use crate::queue::UpdateQueue;
use common::{Candle, MonitorError, StreamConfig, TradeUpdate, VenueConfig};

/// Binance spot client: `@trade` WebSocket stream plus the klines REST endpoint
pub struct BinanceClient {
    http: reqwest::Client,
    rest_url: String,
    ws_url: String,
    api_key: Option<String>,
    heartbeat_interval_secs: u64,
}

/// Trade stream payload
#[derive(Debug, Deserialize)]
struct TradeFrame {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Error body returned by the REST API
#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    msg: String,
}

impl BinanceClient {
    pub fn new(
        venues: &VenueConfig,
        stream: &StreamConfig,
        api_key: Option<String>,
    ) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(venues.request_timeout_secs))
            .build()
            .map_err(|e| MonitorError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            rest_url: venues.binance_rest_url.trim_end_matches('/').to_string(),
            ws_url: stream.ws_base_url.trim_end_matches('/').to_string(),
            api_key,
            heartbeat_interval_secs: stream.heartbeat_interval_secs.max(1),
        })
    }

    /// One client per configured key, or a single anonymous client
    pub fn pool_from_config(
        venues: &VenueConfig,
        stream: &StreamConfig,
    ) -> Result<Vec<Arc<Self>>, MonitorError> {
        if venues.binance_api_keys.is_empty() {
            return Ok(vec![Arc::new(Self::new(venues, stream, None)?)]);
        }

        venues
            .binance_api_keys
            .iter()
            .map(|key| Self::new(venues, stream, Some(key.clone())).map(Arc::new))
            .collect()
    }

    pub fn trade_stream_url(&self, symbol: &str) -> String {
        format!("{}/{}@trade", self.ws_url, symbol.to_lowercase())
    }
}

#[async_trait]
impl TradeStream for BinanceClient {
    async fn subscribe(
        &self,
        symbol: &str,
        queue: Arc<UpdateQueue>,
    ) -> Result<Subscription, MonitorError> {
        let url = self.trade_stream_url(symbol);
        info!("Connecting to Binance trade stream at {}", url);

        let (ws_stream, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| MonitorError::Subscribe {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        info!("✅ Connected to Binance trade stream for {}", symbol);
        debug!("Response status: {:?}", response.status());

        let (mut write, mut read) = ws_stream.split();
        let stream_symbol = symbol.to_string();
        let heartbeat = Duration::from_secs(self.heartbeat_interval_secs);

        let task = tokio::spawn(async move {
            let mut heartbeat_ticker = interval(heartbeat);
            // First tick fires immediately
            heartbeat_ticker.tick().await;

            loop {
                tokio::select! {
                    msg_result = read.next() => {
                        match msg_result {
                            Some(Ok(Message::Text(text))) => match parse_trade_frame(&text) {
                                Ok(Some(update)) => queue.add(update),
                                Ok(None) => debug!("Ignoring non-trade frame on {}", stream_symbol),
                                Err(e) => warn!("Failed to parse trade frame on {}: {}", stream_symbol, e),
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                if let Err(e) = write.send(Message::Pong(payload)).await {
                                    error!("Failed to send PONG on {}: {}", stream_symbol, e);
                                    break;
                                }
                            }
                            Some(Ok(Message::Pong(_))) => debug!("Received PONG"),
                            Some(Ok(Message::Close(_))) => {
                                info!("Trade stream for {} closed by server", stream_symbol);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("Trade stream error on {}: {}", stream_symbol, e);
                                break;
                            }
                            None => {
                                info!("Trade stream for {} ended", stream_symbol);
                                break;
                            }
                        }
                    }
                    _ = heartbeat_ticker.tick() => {
                        if let Err(e) = write.send(Message::Ping(vec![])).await {
                            error!("Failed to send heartbeat on {}: {}", stream_symbol, e);
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(symbol, task))
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, MonitorError> {
        let url = format!("{}/klines", self.rest_url);
        let mut request = self.http.get(&url).query(&[
            ("symbol", symbol.to_uppercase()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("X-MBX-APIKEY", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MonitorError::Upstream(format!("klines request for {}: {}", symbol, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::Upstream(format!("klines body for {}: {}", symbol, e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|err| err.msg)
                .unwrap_or_else(|_| status.to_string());
            return Err(MonitorError::RateLimited {
                symbol: symbol.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(MonitorError::Upstream(format!(
                "klines for {} returned {}: {}",
                symbol, status, body
            )));
        }

        let candles = parse_klines(&body)?;
        debug!("Fetched {} {} candles for {}", candles.len(), interval, symbol);
        Ok(candles)
    }
}

/// `Ok(None)` for frames that are valid JSON but not trades
fn parse_trade_frame(text: &str) -> Result<Option<TradeUpdate>, MonitorError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| MonitorError::Upstream(e.to_string()))?;
    if value.get("e").and_then(|e| e.as_str()) != Some("trade") {
        return Ok(None);
    }

    let frame: TradeFrame =
        serde_json::from_value(value).map_err(|e| MonitorError::Upstream(e.to_string()))?;
    let price: f64 = frame
        .price
        .parse()
        .map_err(|_| MonitorError::Upstream(format!("bad trade price {:?}", frame.price)))?;
    let timestamp = Utc
        .timestamp_millis_opt(frame.trade_time)
        .single()
        .unwrap_or_else(Utc::now);

    debug!("{} trade on {} at {}", frame.event_type, frame.symbol, price);

    Ok(Some(TradeUpdate {
        symbol: frame.symbol,
        price,
        timestamp,
    }))
}

/// Klines arrive as `[openTime, "open", "high", "low", "close", "volume", ...]`
fn parse_klines(body: &str) -> Result<Vec<Candle>, MonitorError> {
    let rows: Vec<Vec<serde_json::Value>> = serde_json::from_str(body)
        .map_err(|e| MonitorError::Upstream(format!("malformed klines: {}", e)))?;

    rows.iter()
        .map(|row| {
            if row.len() < 6 {
                return Err(MonitorError::Upstream(format!(
                    "kline row has {} fields",
                    row.len()
                )));
            }
            let timestamp = row[0]
                .as_i64()
                .ok_or_else(|| MonitorError::Upstream("kline open time".to_string()))?;

            Ok(Candle {
                timestamp,
                open: number(&row[1])?,
                high: number(&row[2])?,
                low: number(&row[3])?,
                close: number(&row[4])?,
                volume: number(&row[5])?,
            })
        })
        .collect()
}

fn number(value: &serde_json::Value) -> Result<f64, MonitorError> {
    match value {
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| MonitorError::Upstream(format!("bad kline number {:?}", s))),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| MonitorError::Upstream(format!("bad kline number {}", n))),
        other => Err(MonitorError::Upstream(format!("bad kline field {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade_frame() {
        let text = r#"{"e":"trade","E":1700000000100,"s":"BTCUSDC","t":12345,"p":"43250.10","q":"0.01","T":1700000000000,"m":true}"#;
        let update = parse_trade_frame(text).unwrap().unwrap();

        assert_eq!(update.symbol, "BTCUSDC");
        assert_eq!(update.price, 43250.10);
        assert_eq!(update.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_non_trade_frames_are_skipped() {
        assert!(parse_trade_frame(r#"{"result":null,"id":1}"#).unwrap().is_none());
        assert!(parse_trade_frame("not json").is_err());
        assert!(parse_trade_frame(r#"{"e":"trade","s":"X","p":"abc","T":0}"#).is_err());
    }

    #[test]
    fn test_parse_klines() {
        let body = r#"[
            [1700000000000,"100.0","101.5","99.5","101.0","12.5",1700003599999,"1262.5",42,"6.0","606.0","0"],
            [1700003600000,"101.0","102.0","100.0","100.5","8.0",1700007199999,"806.0",30,"4.0","402.0","0"]
        ]"#;
        let candles = parse_klines(body).unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_000_000);
        assert_eq!(candles[0].high, 101.5);
        assert_eq!(candles[1].close, 100.5);
        assert_eq!(candles[1].volume, 8.0);
    }

    #[test]
    fn test_parse_klines_rejects_short_rows() {
        assert!(parse_klines(r#"[[1700000000000,"100.0"]]"#).is_err());
        assert!(parse_klines(r#"{"code":-1121,"msg":"Invalid symbol."}"#).is_err());
    }

    #[test]
    fn test_stream_url_and_pool() {
        let mut venues = VenueConfig::default();
        let stream = StreamConfig::default();
        let client = BinanceClient::new(&venues, &stream, None).unwrap();
        assert_eq!(
            client.trade_stream_url("BTCUSDC"),
            "wss://stream.binance.com:9443/ws/btcusdc@trade"
        );

        assert_eq!(BinanceClient::pool_from_config(&venues, &stream).unwrap().len(), 1);
        venues.binance_api_keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(BinanceClient::pool_from_config(&venues, &stream).unwrap().len(), 2);
    }
}
