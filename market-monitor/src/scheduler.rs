//! Prediction Scheduler
//!
//! Trains one direction model per symbol at startup, then forecasts every
//! symbol on a fixed period and publishes the result.

use crate::connectors::{CandleSource, ClientPool};
use crate::databases::PersistenceSink;
use crate::event_bus::EventPublisher;
use crate::shutdown::Shutdown;
use common::{
    BacktestSummary, MonitorError, Prediction, PredictionConfig, PublishedEvent, SignalError,
};
use dashmap::DashMap;
use signal_generation::{prepare_training_data, BacktestReport, DirectionModel, ModelConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Trained models by symbol. Each entry is claimed once; concurrent callers
/// for the same symbol wait on the first caller's training.
#[derive(Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<OnceCell<Arc<DirectionModel>>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<DirectionModel>> {
        self.models
            .get(symbol)
            .and_then(|cell| cell.get().cloned())
    }

    /// Returns the symbol's model, running `train` only if no model exists and
    /// no other caller is training one. A failed `train` leaves the slot empty.
    pub async fn get_or_train<F, Fut>(
        &self,
        symbol: &str,
        train: F,
    ) -> Result<Arc<DirectionModel>, MonitorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DirectionModel, MonitorError>>,
    {
        let cell = Arc::clone(
            self.models
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let model = cell
            .get_or_try_init(|| async move { train().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_trained(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    pub fn trained_symbols(&self) -> Vec<String> {
        self.models
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

pub struct PredictionScheduler {
    candles: ClientPool<dyn CandleSource>,
    registry: Arc<ModelRegistry>,
    /// Replay of each model over its own training window
    backtests: DashMap<String, BacktestSummary>,
    sink: Arc<dyn PersistenceSink>,
    publisher: Arc<dyn EventPublisher>,
    config: PredictionConfig,
    model_config: ModelConfig,
    symbols: Vec<String>,
}

impl PredictionScheduler {
    pub fn new(
        candles: ClientPool<dyn CandleSource>,
        registry: Arc<ModelRegistry>,
        sink: Arc<dyn PersistenceSink>,
        publisher: Arc<dyn EventPublisher>,
        config: PredictionConfig,
        symbols: Vec<String>,
    ) -> Self {
        let model_config = ModelConfig {
            epochs: config.epochs,
            ..ModelConfig::default()
        };

        Self {
            candles,
            registry,
            backtests: DashMap::new(),
            sink,
            publisher,
            config,
            model_config,
            symbols,
        }
    }

    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Training-window backtest of the symbol's model, once trained
    pub fn backtest_summary(&self, symbol: &str) -> Option<BacktestSummary> {
        self.backtests.get(symbol).map(|entry| *entry.value())
    }

    /// Train (or reuse) the model for `symbol` on the full training window
    pub async fn train_model(&self, symbol: &str) -> Result<Arc<DirectionModel>, MonitorError> {
        self.registry
            .get_or_train(symbol, || async {
                let candles = self
                    .candles
                    .next()
                    .fetch_candles(symbol, &self.config.interval, self.config.training_limit)
                    .await?;
                let data = prepare_training_data(&candles)?;

                let mut model = DirectionModel::with_config(self.model_config.clone());
                let (model, summary, replay) = tokio::task::spawn_blocking(move || {
                    model.build();
                    let summary = model.train_on(&data)?;
                    let replay = model.backtest(&data).map(|report| report.summary());
                    Ok::<_, SignalError>((model, summary, replay))
                })
                .await
                .map_err(|e| MonitorError::Upstream(format!("training task failed: {}", e)))??;

                info!(
                    "Model trained for {} ({} samples, loss {:.4}, accuracy {:.4})",
                    symbol, summary.samples, summary.loss, summary.accuracy
                );
                match replay {
                    Ok(replay) => {
                        info!(
                            "Backtest for {}: accuracy {:.2}%, pnl {:.4}%",
                            symbol, replay.accuracy, replay.pnl
                        );
                        self.backtests.insert(symbol.to_string(), replay);
                    }
                    Err(e) => warn!("No backtest for {}: {}", symbol, e),
                }
                Ok::<_, MonitorError>(model)
            })
            .await
    }

    /// Train every symbol in order, retrying each until it succeeds. Returns
    /// false if shutdown interrupted warm-up.
    pub async fn warm_up(&self, shutdown: &mut Shutdown) -> bool {
        for symbol in &self.symbols {
            loop {
                let attempt = tokio::select! {
                    result = self.train_model(symbol) => result,
                    _ = shutdown.wait() => return false,
                };

                match attempt {
                    Ok(_) => break,
                    Err(e) => {
                        error!("Error training model for {}: {}", symbol, e);
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.training_retry()) => {}
                            _ = shutdown.wait() => return false,
                        }
                    }
                }
            }
        }
        true
    }

    /// Forecast the next move for `symbol` from its latest candles, then
    /// persist and publish the prediction
    pub async fn predict_now(&self, symbol: &str) -> Result<Prediction, MonitorError> {
        let model = self
            .registry
            .get(symbol)
            .ok_or(SignalError::ModelNotInitialized)?;

        let candles = self
            .candles
            .next()
            .fetch_candles(symbol, &self.config.interval, self.config.cycle_limit)
            .await?;
        let data = prepare_training_data(&candles)?;
        let latest = data.last().ok_or(SignalError::InsufficientData {
            required: signal_generation::WINDOW,
            actual: candles.len(),
        })?;

        let confidence = model.predict(&latest.features())?;
        let mut prediction = Prediction::from_latest(symbol, latest, confidence);
        prediction.backtest = self.backtest_summary(symbol);

        self.sink
            .record_prediction(&prediction)
            .await
            .map_err(|e| MonitorError::Upstream(format!("persist prediction: {}", e)))?;

        let event = PublishedEvent::NewPrediction(prediction.clone());
        if let Err(e) = self.publisher.publish(&event).await {
            warn!("Failed to publish prediction for {}: {}", symbol, e);
        }

        info!("Generated prediction for {}: {:.4}", symbol, confidence);
        Ok(prediction)
    }

    /// One pass over every symbol. Returns how many predictions were made.
    pub async fn run_cycle(&self) -> usize {
        let mut made = 0;
        for symbol in &self.symbols {
            match self.predict_now(symbol).await {
                Ok(_) => made += 1,
                Err(e) => error!("Error monitoring {}: {}", symbol, e),
            }
        }
        made
    }

    /// Replay the full training window through the symbol's model
    pub async fn backtest(&self, symbol: &str) -> Result<BacktestReport, MonitorError> {
        let model = self.train_model(symbol).await?;
        let candles = self
            .candles
            .next()
            .fetch_candles(symbol, &self.config.interval, self.config.training_limit)
            .await?;
        let data = prepare_training_data(&candles)?;
        Ok(model.backtest(&data)?)
    }

    /// Warm up, then predict every period until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        info!("Training direction models for {} symbol(s)", self.symbols.len());
        if !self.warm_up(&mut shutdown).await {
            info!("Prediction scheduler stopped during warm-up");
            return;
        }

        let mut ticker = interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Prediction scheduler stopped");
    }
}
