use crate::application::horizon_selector::DEFAULT_HORIZONS;
use crate::domain::telemetry::{AmbientConditions, Granularity};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub stream: StreamSettings,
    pub inference: InferenceSettings,
    #[serde(default)]
    pub ambient: AmbientConditions,
    #[serde(default)]
    pub horizons: HorizonSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl StreamSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceSettings {
    pub classifier_url: String,
    pub predictor_url: String,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl InferenceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HorizonSettings {
    #[serde(default = "default_candidates")]
    pub candidates: Vec<u32>,
    #[serde(default = "default_alert_horizon")]
    pub alert_horizon: u32,
    #[serde(default)]
    pub selected: i64,
}

impl Default for HorizonSettings {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            alert_horizon: default_alert_horizon(),
            selected: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertSettings {
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

impl AlertSettings {
    pub fn display(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            display_ms: default_display_ms(),
            fade_ms: default_fade_ms(),
            webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_window_size() -> usize {
    7
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_candidates() -> Vec<u32> {
    DEFAULT_HORIZONS.to_vec()
}

fn default_alert_horizon() -> u32 {
    60
}

fn default_display_ms() -> u64 {
    5000
}

fn default_fade_ms() -> u64 {
    300
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

/// `config/monitor.toml` if present, overridden by `HYDRAI__SECTION__KEY` variables.
pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("HYDRAI")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
