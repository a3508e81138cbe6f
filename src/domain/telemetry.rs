// Telemetry domain models
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTag {
    Arduino,
}

impl SourceTag {
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "arduino" => Some(Self::Arduino),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub timestamp_seconds: i64,
    pub active_seconds: f64,
    pub cumulative_volume_liters: f64,
    pub source: SourceTag,
}

impl TelemetrySample {
    pub fn new(
        timestamp_seconds: i64,
        active_seconds: f64,
        cumulative_volume_liters: f64,
        source: SourceTag,
    ) -> Self {
        Self {
            timestamp_seconds,
            active_seconds,
            cumulative_volume_liters,
            source,
        }
    }
}

/// Consumption label, ordered `Ideal < Normal < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConsumptionLevel {
    Ideal,
    Normal,
    High,
}

impl ConsumptionLevel {
    /// Classifier clusters are 0, 1 and 2 in level order.
    pub fn from_cluster(cluster: i64) -> Option<Self> {
        match cluster {
            0 => Some(Self::Ideal),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ideal => "ideal",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ConsumptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumptionLevel {
    type Err = String;

    // The server labels in Spanish ("bajo"/"alto"); English names are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ideal" | "bajo" | "low" => Ok(Self::Ideal),
            "normal" => Ok(Self::Normal),
            "alto" | "high" => Ok(Self::High),
            other => Err(format!("unknown consumption level '{}'", other)),
        }
    }
}

/// Aggregation granularity the models were trained on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    #[default]
    #[serde(rename = "hora")]
    Hour,
    #[serde(rename = "dia")]
    Day,
}

/// Household and weather context that the live frame does not carry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AmbientConditions {
    #[serde(default = "default_persons")]
    pub persons: f64,
    #[serde(default)]
    pub avg_temperature: f64,
    #[serde(default)]
    pub avg_perceived_temperature: f64,
    #[serde(default)]
    pub avg_humidity: f64,
}

fn default_persons() -> f64 {
    1.0
}

impl Default for AmbientConditions {
    fn default() -> Self {
        Self {
            persons: default_persons(),
            avg_temperature: 0.0,
            avg_perceived_temperature: 0.0,
            avg_humidity: 0.0,
        }
    }
}

/// One row of model input: a sample joined with its calendar and ambient context.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    pub active_seconds: f64,
    pub volume_liters: f64,
    pub persons: f64,
    pub avg_temperature: f64,
    pub avg_perceived_temperature: f64,
    pub avg_humidity: f64,
    pub day_of_month: u32,
    pub hour_of_day: u32,
    pub month: u32,
}

impl ConsumptionRecord {
    pub fn from_sample(sample: &TelemetrySample, ambient: &AmbientConditions) -> Self {
        let local = DateTime::<Utc>::from_timestamp(sample.timestamp_seconds, 0)
            .unwrap_or_default()
            .with_timezone(&Local);

        Self {
            active_seconds: sample.active_seconds,
            volume_liters: sample.cumulative_volume_liters,
            persons: ambient.persons,
            avg_temperature: ambient.avg_temperature,
            avg_perceived_temperature: ambient.avg_perceived_temperature,
            avg_humidity: ambient.avg_humidity,
            day_of_month: local.day(),
            hour_of_day: local.hour(),
            month: local.month(),
        }
    }

    fn hour_for(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Hour => self.hour_of_day,
            Granularity::Day => 0,
        }
    }

    /// Ordered tuple fed to the sequence predictor:
    /// active seconds, hour, temperature, perceived temperature, humidity, day, month.
    pub fn feature_vector(&self, granularity: Granularity) -> [f64; 7] {
        [
            self.active_seconds,
            self.hour_for(granularity) as f64,
            self.avg_temperature,
            self.avg_perceived_temperature,
            self.avg_humidity,
            self.day_of_month as f64,
            self.month as f64,
        ]
    }

    pub fn classifier_features(&self, granularity: Granularity) -> ClassifierFeatures {
        ClassifierFeatures {
            active_seconds: self.active_seconds,
            volume_liters: self.volume_liters,
            persons: self.persons,
            avg_temperature: self.avg_temperature,
            avg_perceived_temperature: self.avg_perceived_temperature,
            avg_humidity: self.avg_humidity,
            day_of_month: self.day_of_month,
            hour_of_day: self.hour_for(granularity),
            month: self.month,
        }
    }
}

/// Body of a classifier request, named the way the service expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierFeatures {
    #[serde(rename = "tiempoActivo")]
    pub active_seconds: f64,
    #[serde(rename = "consumo")]
    pub volume_liters: f64,
    #[serde(rename = "personas")]
    pub persons: f64,
    #[serde(rename = "temperaturaProm")]
    pub avg_temperature: f64,
    #[serde(rename = "sensacionProm")]
    pub avg_perceived_temperature: f64,
    #[serde(rename = "humedadProm")]
    pub avg_humidity: f64,
    #[serde(rename = "dia")]
    pub day_of_month: u32,
    #[serde(rename = "hora")]
    pub hour_of_day: u32,
    #[serde(rename = "mes")]
    pub month: u32,
}

impl ClassifierFeatures {
    /// Same context, with the forecast volume standing in for usage and volume.
    pub fn with_forecast(&self, forecast_volume_liters: f64) -> Self {
        Self {
            active_seconds: forecast_volume_liters,
            volume_liters: forecast_volume_liters,
            ..self.clone()
        }
    }
}
