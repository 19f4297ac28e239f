//! Direction Model
//!
//! Binary classifier over the five normalized indicators: two ReLU hidden
//! layers with dropout and a sigmoid output giving P(next close is higher).

use crate::backtest::{BacktestPoint, BacktestReport};
use crate::features::feature_matrix;
use crate::network::Network;
use common::{FeatureVector, SignalError, MODEL_VERSION};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub type Features = [f64; FeatureVector::NUM_FEATURES];

/// Network and training hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub hidden_units: Vec<usize>,
    pub dropout: f64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of samples held out from the tail for validation
    pub validation_split: f64,
    /// Fixed seed for reproducible training; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_units: vec![32, 16],
            dropout: 0.2,
            learning_rate: 0.001,
            epochs: 50,
            batch_size: 32,
            validation_split: 0.2,
            seed: None,
        }
    }
}

/// Result of a training run, from the final epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Per-symbol direction classifier
#[derive(Debug, Clone)]
pub struct DirectionModel {
    config: ModelConfig,
    network: Option<Network>,
    rng: ChaCha8Rng,
}

impl DirectionModel {
    /// Unbuilt model; call [`DirectionModel::build`] before training.
    pub fn new() -> Self {
        Self::with_config(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            config,
            network: None,
            rng,
        }
    }

    /// Construct the network with freshly initialized weights
    pub fn build(&mut self) {
        let network = Network::new(
            FeatureVector::NUM_FEATURES,
            &self.config.hidden_units,
            self.config.dropout,
            self.config.learning_rate,
            &mut self.rng,
        );
        debug!(
            "Built direction model: {} -> {:?} -> 1",
            network.input_width(),
            self.config.hidden_units
        );
        self.network = Some(network);
    }

    pub fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    pub fn version(&self) -> &str {
        MODEL_VERSION
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit on feature rows and 0/1 labels. Extra rows on either side are ignored.
    pub fn train(&mut self, features: &[Features], labels: &[f64]) -> Result<TrainingSummary, SignalError> {
        let network = self.network.as_mut().ok_or(SignalError::ModelNotInitialized)?;

        let samples: Vec<(&[f64], f64)> = features
            .iter()
            .zip(labels)
            .map(|(row, &label)| (row.as_slice(), label))
            .collect();

        if samples.is_empty() {
            return Err(SignalError::InvalidInput("no training samples".to_string()));
        }

        let split_at = (samples.len() as f64 * (1.0 - self.config.validation_split)).floor() as usize;
        let (train_set, val_set) = if split_at == 0 || split_at >= samples.len() {
            (&samples[..], &samples[samples.len()..])
        } else {
            samples.split_at(split_at)
        };

        let mut summary = TrainingSummary {
            epochs: self.config.epochs,
            samples: train_set.len(),
            loss: f64::NAN,
            accuracy: 0.0,
            val_loss: None,
            val_accuracy: None,
        };

        for epoch in 0..self.config.epochs {
            let metrics = network.train_epoch(train_set, self.config.batch_size, &mut self.rng);
            summary.loss = metrics.loss;
            summary.accuracy = metrics.accuracy;

            if val_set.is_empty() {
                info!(
                    "Epoch {}: loss = {:.4}, accuracy = {:.4}",
                    epoch + 1,
                    metrics.loss,
                    metrics.accuracy
                );
            } else {
                let val = network.evaluate(val_set);
                summary.val_loss = Some(val.loss);
                summary.val_accuracy = Some(val.accuracy);
                info!(
                    "Epoch {}: loss = {:.4}, accuracy = {:.4}, val_loss = {:.4}, val_accuracy = {:.4}",
                    epoch + 1,
                    metrics.loss,
                    metrics.accuracy,
                    val.loss,
                    val.accuracy
                );
            }
        }

        Ok(summary)
    }

    /// Fit directly on Feature Engine output
    pub fn train_on(&mut self, data: &[FeatureVector]) -> Result<TrainingSummary, SignalError> {
        let (features, labels) = feature_matrix(data);
        self.train(&features, &labels)
    }

    /// Confidence in [0, 1] that the next close is higher
    pub fn predict(&self, features: &Features) -> Result<f64, SignalError> {
        let network = self.network.as_ref().ok_or(SignalError::ModelNotInitialized)?;
        Ok(network.predict(features))
    }

    /// Replay labeled rows through the model and tally the hit rate.
    ///
    /// `pnl` sums, in percent, the next-period return taken in the predicted
    /// direction, using the following row's close.
    pub fn backtest(&self, data: &[FeatureVector]) -> Result<BacktestReport, SignalError> {
        let mut predictions = Vec::new();
        let mut correct = 0usize;
        let mut pnl = 0.0;

        for (i, point) in data.iter().enumerate() {
            let Some(target) = point.target else {
                continue;
            };

            let confidence = self.predict(&point.features())?;
            let predicted_direction = confidence > 0.5;
            let actual_direction = target == 1.0;

            if predicted_direction == actual_direction {
                correct += 1;
            }

            if let Some(next) = data.get(i + 1) {
                let move_pct = (next.close - point.close) / point.close * 100.0;
                pnl += if predicted_direction { move_pct } else { -move_pct };
            }

            predictions.push(BacktestPoint {
                timestamp: point.timestamp,
                confidence,
                predicted_direction,
                actual_direction,
                price: point.close,
            });
        }

        if predictions.is_empty() {
            return Err(SignalError::NoScoreableData);
        }

        let total = predictions.len();
        Ok(BacktestReport {
            accuracy: correct as f64 / total as f64 * 100.0,
            total_trades: total,
            profitable_trades: correct,
            pnl,
            predictions,
        })
    }
}

impl Default for DirectionModel {
    fn default() -> Self {
        Self::new()
    }
}
