// Alert domain models
use super::telemetry::ConsumptionLevel;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const ALERT_TITLE: &str = "Alert!";

/// Raw notification signal lifted out of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertSignal {
    pub horizon_seconds: u32,
    pub forecast_volume_liters: f64,
    pub forecast_level: ConsumptionLevel,
    pub active_seconds: f64,
    pub raised_at: DateTime<Utc>,
}

impl AlertSignal {
    /// Body shared by the push notification and the banner.
    pub fn compose_body(&self) -> String {
        format!(
            "You are about to consume {:.2} liters\nYour consumption level will be {}\nYou have been using water for {} seconds",
            self.forecast_volume_liters, self.forecast_level, self.active_seconds
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub message: String,
    pub level: ConsumptionLevel,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl AlertEvent {
    pub fn from_signal(signal: &AlertSignal, ttl: Duration) -> Self {
        Self {
            message: format!("ALERT!\n{}", signal.compose_body()),
            level: signal.forecast_level,
            created_at: signal.raised_at,
            ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_message() {
        let signal = AlertSignal {
            horizon_seconds: 60,
            forecast_volume_liters: 12.345,
            forecast_level: ConsumptionLevel::High,
            active_seconds: 95.0,
            raised_at: Utc::now(),
        };

        assert_eq!(
            signal.compose_body(),
            "You are about to consume 12.35 liters\nYour consumption level will be high\nYou have been using water for 95 seconds"
        );

        let event = AlertEvent::from_signal(&signal, Duration::from_millis(5000));
        assert!(event.message.starts_with("ALERT!\nYou are about to consume 12.35 liters"));
        assert_eq!(event.level, ConsumptionLevel::High);
        assert_eq!(event.ttl, Duration::from_secs(5));
    }
}
