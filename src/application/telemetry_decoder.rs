// Telemetry decoder - Maps one inbound frame to a closed set of typed events
use crate::domain::alert::AlertSignal;
use crate::domain::error::DecodeError;
use crate::domain::forecast::{PredictionEntry, PredictionMap};
use crate::domain::telemetry::{ConsumptionLevel, SourceTag, TelemetrySample};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Sample(TelemetrySample),
    Predictions {
        current_level: ConsumptionLevel,
        predictions: PredictionMap,
    },
    LevelUpdate(ConsumptionLevel),
    ForecastReply { volume_liters: f64 },
    Notification(AlertSignal),
    DecodeError(DecodeError),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    source: Option<String>,
    tiempo: Option<f64>,
    consumo: Option<f64>,
    #[serde(rename = "AIData")]
    ai_data: Option<RawAiData>,
    #[serde(rename = "nivelConsumo")]
    level: Option<String>,
    prediccion: Option<f64>,
    #[serde(rename = "notificacion")]
    notification: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAiData {
    #[serde(rename = "etiquetaActual")]
    current_label: Option<String>,
    #[serde(rename = "predicciones")]
    predictions: Option<HashMap<String, RawPrediction>>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    prediccion: Option<f64>,
    etiqueta: Option<String>,
}

/// Decode a frame into events, in the order sample, predictions, level,
/// forecast reply, notification. Never fails: problems become `DecodeError` events.
///
/// A malformed frame yields exactly one `DecodeError` and nothing else. The only
/// partial case is a notification whose `alert_horizon` entry is missing: the rest
/// of the frame is kept and the alert is replaced by a `DecodeError`.
pub fn decode(frame: &str, received_at: DateTime<Utc>, alert_horizon: u32) -> Vec<TelemetryEvent> {
    let raw: RawFrame = match serde_json::from_str(frame) {
        Ok(raw) => raw,
        Err(e) => return vec![TelemetryEvent::DecodeError(DecodeError::MalformedJson(e.to_string()))],
    };

    match decode_frame(raw, received_at, alert_horizon) {
        Ok(events) if events.is_empty() => vec![TelemetryEvent::DecodeError(DecodeError::UnrecognizedFrame)],
        Ok(events) => events,
        Err(e) => vec![TelemetryEvent::DecodeError(e)],
    }
}

fn decode_frame(
    raw: RawFrame,
    received_at: DateTime<Utc>,
    alert_horizon: u32,
) -> Result<Vec<TelemetryEvent>, DecodeError> {
    let mut events = Vec::new();

    let source = raw.source.as_deref().and_then(SourceTag::from_marker);
    let sample = match source {
        Some(tag) => Some(decode_sample(&raw, tag, received_at)?),
        None => None,
    };

    let predictions = match &raw.ai_data {
        Some(ai) => Some(decode_ai_data(ai)?),
        None => None,
    };

    // An empty label means no level update.
    let level = raw
        .level
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .map(|l| parse_level("nivelConsumo", l))
        .transpose()?;

    let forecast_reply = match raw.prediccion {
        Some(v) if !v.is_finite() => {
            return Err(DecodeError::InvalidField {
                field: "prediccion",
                reason: "not a finite number".to_string(),
            });
        }
        other => other,
    };

    let active_seconds = match (&sample, raw.tiempo) {
        (Some(sample), _) => sample.active_seconds,
        (None, Some(_)) => require_non_negative("tiempo", raw.tiempo)?,
        (None, None) => 0.0,
    };

    if let Some(sample) = &sample {
        events.push(TelemetryEvent::Sample(sample.clone()));
    }

    if let Some((current_level, map)) = &predictions {
        events.push(TelemetryEvent::Predictions {
            current_level: *current_level,
            predictions: map.clone(),
        });
    }

    if let Some(level) = level {
        events.push(TelemetryEvent::LevelUpdate(level));
    }

    if let Some(volume_liters) = forecast_reply {
        events.push(TelemetryEvent::ForecastReply { volume_liters });
    }

    if raw.notification.unwrap_or(false) {
        let entry = predictions
            .as_ref()
            .and_then(|(_, map)| map.get(&alert_horizon));

        match entry {
            Some(entry) => events.push(TelemetryEvent::Notification(AlertSignal {
                horizon_seconds: entry.horizon_seconds,
                forecast_volume_liters: entry.forecast_volume_liters,
                forecast_level: entry.forecast_level,
                active_seconds,
                raised_at: received_at,
            })),
            None => events.push(TelemetryEvent::DecodeError(DecodeError::MissingAlertHorizon(
                alert_horizon,
            ))),
        }
    }

    Ok(events)
}

fn decode_sample(raw: &RawFrame, source: SourceTag, received_at: DateTime<Utc>) -> Result<TelemetrySample, DecodeError> {
    let active_seconds = require_non_negative("tiempo", raw.tiempo)?;
    let volume = require_non_negative("consumo", raw.consumo)?;

    Ok(TelemetrySample::new(
        received_at.timestamp(),
        active_seconds,
        volume,
        source,
    ))
}

fn require_non_negative(field: &'static str, value: Option<f64>) -> Result<f64, DecodeError> {
    let value = value.ok_or(DecodeError::MissingField(field))?;
    if !value.is_finite() || value < 0.0 {
        return Err(DecodeError::InvalidField {
            field,
            reason: format!("expected a non-negative number, got {}", value),
        });
    }
    Ok(value)
}

fn decode_ai_data(ai: &RawAiData) -> Result<(ConsumptionLevel, PredictionMap), DecodeError> {
    let label = ai
        .current_label
        .as_deref()
        .ok_or(DecodeError::MissingField("etiquetaActual"))?;
    let current_level = parse_level("etiquetaActual", label)?;

    let mut map = PredictionMap::new();
    for (key, raw) in ai.predictions.iter().flatten() {
        let horizon: u32 = key.trim().parse().map_err(|_| DecodeError::InvalidField {
            field: "predicciones",
            reason: format!("horizon key '{}' is not a whole number of seconds", key),
        })?;
        let volume = require_non_negative("prediccion", raw.prediccion)?;
        let label = raw.etiqueta.as_deref().ok_or(DecodeError::MissingField("etiqueta"))?;
        let level = parse_level("etiqueta", label)?;

        map.insert(horizon, PredictionEntry::new(horizon, volume, level));
    }

    Ok((current_level, map))
}

fn parse_level(field: &'static str, label: &str) -> Result<ConsumptionLevel, DecodeError> {
    label
        .parse()
        .map_err(|reason| DecodeError::InvalidField { field, reason })
}
