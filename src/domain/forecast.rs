// Forecast domain models
use super::telemetry::{ConsumptionLevel, TelemetrySample};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEntry {
    pub horizon_seconds: u32,
    pub forecast_volume_liters: f64,
    pub forecast_level: ConsumptionLevel,
}

impl PredictionEntry {
    pub fn new(horizon_seconds: u32, forecast_volume_liters: f64, forecast_level: ConsumptionLevel) -> Self {
        Self {
            horizon_seconds,
            forecast_volume_liters,
            forecast_level,
        }
    }
}

/// Server forecasts keyed by horizon. Replaced wholesale, never merged.
pub type PredictionMap = BTreeMap<u32, PredictionEntry>;

/// Loading/unavailable indicator for the local inference pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InferenceStatus {
    #[default]
    Idle,
    Running,
    Ready,
    Unavailable { reason: String },
}

/// Read-only view of everything the session has learned so far.
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    pub latest: Option<TelemetrySample>,
    pub current_level: Option<ConsumptionLevel>,
    pub forecast_volume_liters: Option<f64>,
    pub forecast_level: Option<ConsumptionLevel>,
    pub predictions: PredictionMap,
    pub reported_level: Option<ConsumptionLevel>,
    pub server_forecast_liters: Option<f64>,
    pub inference: InferenceStatus,
}
