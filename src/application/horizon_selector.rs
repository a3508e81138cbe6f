// Prediction horizon selector - Snaps a requested horizon onto the forecast grid
use crate::domain::error::SelectionError;
use crate::domain::forecast::{MonitorSnapshot, PredictionEntry};
use crate::domain::telemetry::ConsumptionLevel;

pub const DEFAULT_HORIZONS: [u32; 7] = [0, 1, 5, 10, 15, 30, 60];

/// What the view shows for the chosen horizon.
#[derive(Debug, Clone, PartialEq)]
pub enum HorizonReading {
    /// Horizon 0: live level and cumulative volume.
    Current {
        level: Option<ConsumptionLevel>,
        volume_liters: Option<f64>,
    },
    Forecast(PredictionEntry),
    /// The snapped horizon has no forecast in the current map.
    Unknown { horizon_seconds: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub requested: i64,
    pub horizon_seconds: u32,
    /// The request fell outside the candidate range.
    pub clamped: bool,
}

#[derive(Debug, Clone)]
pub struct HorizonSelector {
    candidates: Vec<u32>,
}

impl HorizonSelector {
    /// Candidates keep the given order; it decides ties.
    pub fn new(candidates: Vec<u32>) -> Result<Self, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::EmptyCandidateSet);
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[u32] {
        &self.candidates
    }

    /// Nearest candidate by absolute difference; the first one listed wins a tie.
    pub fn snap(&self, requested: i64) -> Selection {
        let mut best = self.candidates[0];
        for &candidate in &self.candidates[1..] {
            if (candidate as i64).abs_diff(requested) < (best as i64).abs_diff(requested) {
                best = candidate;
            }
        }

        let min = self.candidates.iter().min().copied().unwrap_or(best) as i64;
        let max = self.candidates.iter().max().copied().unwrap_or(best) as i64;
        let clamped = requested < min || requested > max;
        if clamped {
            tracing::debug!(requested, horizon = best, "Horizon out of range, clamped");
        }

        Selection {
            requested,
            horizon_seconds: best,
            clamped,
        }
    }

    pub fn read(&self, requested: i64, snapshot: &MonitorSnapshot) -> HorizonReading {
        let horizon_seconds = self.snap(requested).horizon_seconds;

        if horizon_seconds == 0 {
            return HorizonReading::Current {
                level: snapshot.current_level,
                volume_liters: snapshot.latest.as_ref().map(|s| s.cumulative_volume_liters),
            };
        }

        match snapshot.predictions.get(&horizon_seconds) {
            Some(entry) => HorizonReading::Forecast(entry.clone()),
            None => HorizonReading::Unknown { horizon_seconds },
        }
    }
}

impl Default for HorizonSelector {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_HORIZONS.to_vec(),
        }
    }
}
