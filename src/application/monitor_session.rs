// Monitor session - Single writer between the stream, the pipeline and the alerts
use crate::application::alert_coordinator::{AlertCoordinator, BannerState};
use crate::application::connection_manager::{ConnectionManager, ConnectionState};
use crate::application::frame_transport::FrameTransport;
use crate::application::horizon_selector::{HorizonReading, HorizonSelector, Selection};
use crate::application::inference_pipeline::{InferenceOutcome, InferencePipeline};
use crate::application::telemetry_decoder::{self, TelemetryEvent};
use crate::domain::alert::AlertEvent;
use crate::domain::error::{ConnectionError, InferenceError};
use crate::domain::forecast::{InferenceStatus, MonitorSnapshot};
use crate::domain::telemetry::{ConsumptionLevel, TelemetrySample};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const FRAME_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Published once per occurrence; every subscriber gets its own copy.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Telemetry(TelemetryEvent),
    InferenceCompleted(InferenceOutcome),
    InferenceFailed(InferenceError),
    Alert(AlertEvent),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub endpoint: String,
    pub reconnect_delay: Duration,
    pub alert_horizon: u32,
}

/// Owns every piece of mutable session state. Frames are applied one at a
/// time, in receipt order, and nothing else writes the window or the forecasts.
pub struct MonitorSession {
    pipeline: InferencePipeline,
    alerts: Arc<AlertCoordinator>,
    alert_horizon: u32,
    latest: Option<TelemetrySample>,
    reported_level: Option<ConsumptionLevel>,
    server_forecast_liters: Option<f64>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<MonitorSnapshot>,
}

impl MonitorSession {
    pub fn new(
        pipeline: InferencePipeline,
        alerts: Arc<AlertCoordinator>,
        alert_horizon: u32,
        events: broadcast::Sender<SessionEvent>,
        snapshot: watch::Sender<MonitorSnapshot>,
    ) -> Self {
        Self {
            pipeline,
            alerts,
            alert_horizon,
            latest: None,
            reported_level: None,
            server_forecast_liters: None,
            events,
            snapshot,
        }
    }

    /// Wire the session up and start its writer task.
    pub fn start(
        transport: Arc<dyn FrameTransport>,
        settings: SessionSettings,
        pipeline: InferencePipeline,
        alerts: Arc<AlertCoordinator>,
        selector: HorizonSelector,
    ) -> MonitorHandle {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(MonitorSnapshot::default());

        let connection = Arc::new(ConnectionManager::new(
            transport,
            settings.endpoint,
            settings.reconnect_delay,
            frames_tx,
        ));

        let session = MonitorSession::new(
            pipeline,
            alerts.clone(),
            settings.alert_horizon,
            events.clone(),
            snapshot_tx,
        );
        let writer = tokio::spawn(session.run(frames_rx));

        MonitorHandle {
            connection,
            alerts,
            selector,
            events,
            snapshot: snapshot_rx,
            writer,
        }
    }

    async fn run(mut self, mut frames: mpsc::Receiver<String>) {
        while let Some(frame) = frames.recv().await {
            self.handle_frame(&frame).await;
        }
        tracing::debug!("Frame channel closed, writer stopping");
    }

    /// Decode one frame and apply its events in order.
    pub async fn handle_frame(&mut self, frame: &str) {
        tracing::debug!(frame, "Frame received");
        let events = telemetry_decoder::decode(frame, Utc::now(), self.alert_horizon);
        let mut sample_arrived = false;

        for event in events {
            self.publish(SessionEvent::Telemetry(event.clone()));

            match event {
                TelemetryEvent::Sample(sample) => {
                    self.pipeline.record(&sample);
                    self.latest = Some(sample);
                    sample_arrived = true;
                }
                TelemetryEvent::Predictions {
                    current_level,
                    predictions,
                } => {
                    self.pipeline
                        .apply_server_predictions(current_level, predictions);
                }
                TelemetryEvent::LevelUpdate(level) => self.reported_level = Some(level),
                TelemetryEvent::ForecastReply { volume_liters } => {
                    self.server_forecast_liters = Some(volume_liters);
                }
                TelemetryEvent::Notification(signal) => {
                    let alert = self.alerts.raise(&signal).await;
                    self.publish(SessionEvent::Alert(alert));
                }
                TelemetryEvent::DecodeError(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable frame");
                }
            }
        }

        if !sample_arrived {
            self.snapshot.send_replace(self.build_snapshot());
            return;
        }

        let mut running = self.build_snapshot();
        running.inference = InferenceStatus::Running;
        self.snapshot.send_replace(running);

        let result = self.pipeline.run().await;
        self.snapshot.send_replace(self.build_snapshot());

        match result {
            Ok(outcome) => self.publish(SessionEvent::InferenceCompleted(outcome)),
            Err(e) => self.publish(SessionEvent::InferenceFailed(e)),
        }
    }

    fn build_snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            latest: self.latest.clone(),
            current_level: self.pipeline.current_level(),
            forecast_volume_liters: self.pipeline.forecast_volume_liters(),
            forecast_level: self.pipeline.forecast_level(),
            predictions: self.pipeline.predictions().clone(),
            reported_level: self.reported_level,
            server_forecast_liters: self.server_forecast_liters,
            inference: self.pipeline.status().clone(),
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Caller-side handle to a running session. Everything here only reads
/// snapshots or talks to the connection; the writer task owns the state.
pub struct MonitorHandle {
    connection: Arc<ConnectionManager>,
    alerts: Arc<AlertCoordinator>,
    selector: HorizonSelector,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<MonitorSnapshot>,
    writer: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn connect(&self, token: &str) -> Result<(), ConnectionError> {
        self.connection.connect(token).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<BannerState> {
        self.alerts.subscribe()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn snap_horizon(&self, requested: i64) -> Selection {
        self.selector.snap(requested)
    }

    pub fn read_horizon(&self, requested: i64) -> HorizonReading {
        self.selector.read(requested, &self.snapshot.borrow())
    }

    /// Ask the server for a one-off forecast `seconds` ahead.
    pub async fn request_forecast(&self, seconds: u32) -> Result<(), ConnectionError> {
        let request = serde_json::json!({ "source": "client", "tiempo": seconds });
        self.connection.send(request.to_string()).await
    }

    /// Tear the connection down, cancel the banner timer and stop the writer.
    pub async fn shutdown(self) {
        self.connection.teardown().await;
        self.alerts.shutdown().await;
        self.writer.abort();
        tracing::info!("Monitor session stopped");
    }
}
