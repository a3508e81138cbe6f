// Main entry point - Dependency injection and session setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::alert_coordinator::AlertCoordinator;
use crate::application::horizon_selector::HorizonSelector;
use crate::application::inference_pipeline::InferencePipeline;
use crate::application::monitor_session::{MonitorSession, SessionSettings};
use crate::application::notification_dispatcher::NotificationDispatcher;
use crate::infrastructure::config::load_monitor_config;
use crate::infrastructure::hydrai_client::HydraiClient;
use crate::infrastructure::notifier::{LogNotifier, WebhookNotifier};
use crate::infrastructure::ws_transport::WsTransport;
use crate::presentation::console::Console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_monitor_config().context("Failed to load monitor configuration")?;

    // Adapters (infrastructure layer)
    let transport = Arc::new(WsTransport::new());
    let models = Arc::new(HydraiClient::new(
        config.inference.classifier_url.clone(),
        config.inference.predictor_url.clone(),
        config.stream.token.clone(),
        config.inference.request_timeout(),
    )?);
    let dispatcher: Arc<dyn NotificationDispatcher> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), config.alerts.webhook_timeout())?),
        None => Arc::new(LogNotifier),
    };

    // Session (application layer)
    let selector = HorizonSelector::new(config.horizons.candidates.clone())
        .context("At least one horizon candidate is required")?;
    let pipeline = InferencePipeline::new(
        models,
        config.inference.granularity,
        config.ambient,
        config.inference.window_size,
    );
    let alerts = Arc::new(AlertCoordinator::new(
        dispatcher,
        config.alerts.display(),
        config.alerts.fade(),
    ));
    let settings = SessionSettings {
        endpoint: config.stream.url.clone(),
        reconnect_delay: config.stream.reconnect_delay(),
        alert_horizon: config.horizons.alert_horizon,
    };
    let handle = MonitorSession::start(transport, settings, pipeline, alerts, selector);

    tracing::info!(endpoint = %config.stream.url, "Starting hydrai-monitor");
    handle.connect(&config.stream.token).await?;

    // Front end (presentation layer)
    let console = Console::new(&handle, config.stream.token.clone(), config.horizons.selected);
    let result = console.run().await;

    handle.shutdown().await;
    result
}
