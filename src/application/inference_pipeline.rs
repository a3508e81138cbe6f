// Inference pipeline - Classifier and sequence predictor over a rolling window
use crate::application::prediction_service::PredictionService;
use crate::domain::error::InferenceError;
use crate::domain::forecast::{InferenceStatus, PredictionMap};
use crate::domain::telemetry::{
    AmbientConditions, ClassifierFeatures, ConsumptionLevel, ConsumptionRecord, Granularity,
    TelemetrySample,
};
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_WINDOW: usize = 7;

/// Bounded buffer of the most recent records, oldest first.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    records: VecDeque<ConsumptionRecord>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: ConsumptionRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn latest(&self) -> Option<&ConsumptionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn sequence(&self, granularity: Granularity) -> Vec<[f64; 7]> {
        self.records
            .iter()
            .map(|r| r.feature_vector(granularity))
            .collect()
    }
}

/// Result of one successful run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOutcome {
    pub current_level: ConsumptionLevel,
    pub forecast_volume_liters: f64,
    pub forecast_level: ConsumptionLevel,
}

/// Sole owner of the rolling window and the prediction map.
///
/// `run` takes `&mut self`, so a second run cannot start, and the window cannot
/// change, while one is in flight.
pub struct InferencePipeline {
    service: Arc<dyn PredictionService>,
    granularity: Granularity,
    ambient: AmbientConditions,
    window: RollingWindow,
    predictions: PredictionMap,
    current_level: Option<ConsumptionLevel>,
    forecast_volume_liters: Option<f64>,
    forecast_level: Option<ConsumptionLevel>,
    status: InferenceStatus,
    last_active_seconds: Option<f64>,
}

impl InferencePipeline {
    pub fn new(
        service: Arc<dyn PredictionService>,
        granularity: Granularity,
        ambient: AmbientConditions,
        window_size: usize,
    ) -> Self {
        Self {
            service,
            granularity,
            ambient,
            window: RollingWindow::new(window_size),
            predictions: PredictionMap::new(),
            current_level: None,
            forecast_volume_liters: None,
            forecast_level: None,
            status: InferenceStatus::Idle,
            last_active_seconds: None,
        }
    }

    /// Append a sample to the window. Active time going backwards means the
    /// device restarted its counter, so the window starts over.
    pub fn record(&mut self, sample: &TelemetrySample) {
        if let Some(last) = self.last_active_seconds {
            if sample.active_seconds < last {
                tracing::warn!(
                    previous = last,
                    current = sample.active_seconds,
                    "Active time went backwards, clearing rolling window"
                );
                self.window.clear();
            }
        }
        self.last_active_seconds = Some(sample.active_seconds);
        self.window
            .push(ConsumptionRecord::from_sample(sample, &self.ambient));
    }

    /// Replace the server-side forecasts wholesale.
    pub fn apply_server_predictions(&mut self, current_level: ConsumptionLevel, predictions: PredictionMap) {
        self.current_level = Some(current_level);
        self.predictions = predictions;
    }

    /// Classify, forecast, classify the forecast. Calls run strictly one after
    /// another; any failure leaves all three outputs at their previous values.
    pub async fn run(&mut self) -> Result<InferenceOutcome, InferenceError> {
        self.status = InferenceStatus::Running;

        let result = self.evaluate().await;
        match result {
            Ok(outcome) => {
                self.current_level = Some(outcome.current_level);
                self.forecast_volume_liters = Some(outcome.forecast_volume_liters);
                self.forecast_level = Some(outcome.forecast_level);
                self.status = InferenceStatus::Ready;
                tracing::debug!(?outcome, "Inference run complete");
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Inference run aborted, keeping previous results");
                self.status = InferenceStatus::Unavailable {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn evaluate(&self) -> Result<InferenceOutcome, InferenceError> {
        let latest = self.window.latest().ok_or(InferenceError::EmptyWindow)?;
        let features = latest.classifier_features(self.granularity);

        let current_level = self.classify(&features).await?;

        let sequence = self.window.sequence(self.granularity);
        let forecast_volume_liters = self
            .service
            .predict_sequence(self.granularity, &sequence)
            .await
            .map_err(|e| InferenceError::Predictor(format!("{:#}", e)))?;

        let forecast_level = self
            .classify(&features.with_forecast(forecast_volume_liters))
            .await?;

        Ok(InferenceOutcome {
            current_level,
            forecast_volume_liters,
            forecast_level,
        })
    }

    async fn classify(&self, features: &ClassifierFeatures) -> Result<ConsumptionLevel, InferenceError> {
        let cluster = self
            .service
            .classify(self.granularity, features)
            .await
            .map_err(|e| InferenceError::Classifier(format!("{:#}", e)))?;

        ConsumptionLevel::from_cluster(cluster).ok_or(InferenceError::UnknownCluster(cluster))
    }

    pub fn current_level(&self) -> Option<ConsumptionLevel> {
        self.current_level
    }

    pub fn forecast_volume_liters(&self) -> Option<f64> {
        self.forecast_volume_liters
    }

    pub fn forecast_level(&self) -> Option<ConsumptionLevel> {
        self.forecast_level
    }

    pub fn predictions(&self) -> &PredictionMap {
        &self.predictions
    }

    pub fn status(&self) -> &InferenceStatus {
        &self.status
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}
