// Prediction service trait - The two external model endpoints
use crate::domain::telemetry::{ClassifierFeatures, Granularity};
use async_trait::async_trait;

#[async_trait]
pub trait PredictionService: Send + Sync {
    /// Classify one feature row; returns the raw cluster id.
    async fn classify(&self, range: Granularity, features: &ClassifierFeatures) -> anyhow::Result<i64>;

    /// Forecast volume from up to the last seven feature vectors, oldest first.
    async fn predict_sequence(&self, range: Granularity, sequence: &[[f64; 7]]) -> anyhow::Result<f64>;
}
