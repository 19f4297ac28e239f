pub mod timeseries;

pub use timeseries::TimeSeriesDB;

use anyhow::Result;
use async_trait::async_trait;
use common::{ArbitrageOpportunity, Prediction, Uuid};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Append-only store for profitable opportunities and every prediction
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()>;

    async fn record_prediction(&self, prediction: &Prediction) -> Result<()>;
}

/// Prediction hit rate for one symbol, over predictions with a known outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStats {
    pub total: usize,
    pub resolved: usize,
    pub correct: usize,
    /// Percent; `None` until at least one prediction is resolved
    pub accuracy: Option<f64>,
    /// Mean confidence of the resolved predictions
    pub avg_confidence: Option<f64>,
}

/// Process-local sink used when no database is configured
#[derive(Default)]
pub struct InMemorySink {
    opportunities: RwLock<Vec<ArbitrageOpportunity>>,
    predictions: RwLock<Vec<Prediction>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn opportunities(&self) -> Vec<ArbitrageOpportunity> {
        self.opportunities.read().await.clone()
    }

    pub async fn predictions(&self) -> Vec<Prediction> {
        self.predictions.read().await.clone()
    }

    /// Attach the realized direction to a stored prediction
    pub async fn set_actual_direction(&self, id: Uuid, actual: bool) -> bool {
        let mut predictions = self.predictions.write().await;
        match predictions.iter_mut().find(|p| p.id == id) {
            Some(prediction) => {
                prediction.actual_direction = Some(actual);
                true
            }
            None => false,
        }
    }

    pub async fn model_stats(&self) -> HashMap<String, ModelStats> {
        let predictions = self.predictions.read().await;
        let mut stats: HashMap<String, ModelStats> = HashMap::new();
        let mut confidence_sums: HashMap<String, f64> = HashMap::new();

        for prediction in predictions.iter() {
            let entry = stats.entry(prediction.symbol.clone()).or_insert(ModelStats {
                total: 0,
                resolved: 0,
                correct: 0,
                accuracy: None,
                avg_confidence: None,
            });
            entry.total += 1;
            if let Some(actual) = prediction.actual_direction {
                entry.resolved += 1;
                *confidence_sums.entry(prediction.symbol.clone()).or_default() +=
                    prediction.confidence;
                if actual == prediction.predicted_direction {
                    entry.correct += 1;
                }
            }
        }

        for (symbol, entry) in stats.iter_mut() {
            if entry.resolved > 0 {
                let resolved = entry.resolved as f64;
                entry.accuracy = Some(entry.correct as f64 / resolved * 100.0);
                entry.avg_confidence = confidence_sums.get(symbol).map(|sum| sum / resolved);
            }
        }

        stats
    }
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn record_opportunity(&self, opportunity: &ArbitrageOpportunity) -> Result<()> {
        self.opportunities.write().await.push(opportunity.clone());
        Ok(())
    }

    async fn record_prediction(&self, prediction: &Prediction) -> Result<()> {
        self.predictions.write().await.push(prediction.clone());
        Ok(())
    }
}
