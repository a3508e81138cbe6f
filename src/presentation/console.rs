// Console front end - Renders session events and reads operator commands from stdin
use crate::application::alert_coordinator::{BannerPhase, BannerState};
use crate::application::horizon_selector::HorizonReading;
use crate::application::monitor_session::{MonitorHandle, SessionEvent};
use crate::application::telemetry_decoder::TelemetryEvent;
use crate::domain::forecast::InferenceStatus;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A bare number picks the displayed horizon, in seconds.
    Select(i64),
    Forecast(u32),
    Reconnect,
    Status,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let command = match (head, parts.next()) {
        ("q" | "quit", None) => Command::Quit,
        ("r" | "reconnect", None) => Command::Reconnect,
        ("s" | "status", None) => Command::Status,
        ("f" | "forecast", Some(secs)) => match secs.parse() {
            Ok(secs) => Command::Forecast(secs),
            Err(_) => Command::Unknown(line.to_string()),
        },
        (value, None) => match value.parse() {
            Ok(secs) => Command::Select(secs),
            Err(_) => Command::Unknown(line.to_string()),
        },
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

pub fn render_reading(horizon_seconds: u32, reading: &HorizonReading) -> String {
    match reading {
        HorizonReading::Current {
            level,
            volume_liters,
        } => format!(
            "[now] level {} | {} consumed",
            level.map(|l| l.as_str()).unwrap_or("-"),
            volume_liters
                .map(|v| format!("{:.2} L", v))
                .unwrap_or_else(|| "-".to_string())
        ),
        HorizonReading::Forecast(entry) => format!(
            "[+{}s] {:.2} L expected, level {}",
            entry.horizon_seconds, entry.forecast_volume_liters, entry.forecast_level
        ),
        HorizonReading::Unknown { .. } => format!("[+{}s] no forecast yet", horizon_seconds),
    }
}

fn render_event(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::Telemetry(TelemetryEvent::Sample(sample)) => format!(
            "sample: {:.0}s active, {:.2} L total",
            sample.active_seconds, sample.cumulative_volume_liters
        ),
        SessionEvent::Telemetry(TelemetryEvent::LevelUpdate(level)) => {
            format!("server level: {}", level)
        }
        SessionEvent::Telemetry(TelemetryEvent::ForecastReply { volume_liters }) => {
            format!("server forecast: {:.2} L", volume_liters)
        }
        SessionEvent::InferenceCompleted(outcome) => format!(
            "model: level {} -> {:.2} L ({})",
            outcome.current_level, outcome.forecast_volume_liters, outcome.forecast_level
        ),
        SessionEvent::InferenceFailed(e) => format!("model unavailable: {}", e),
        _ => return None,
    };
    Some(line)
}

/// `shown` is the last banner generation already printed; each banner prints once.
fn render_banner(banner: &BannerState, shown: &mut u64) -> Option<String> {
    match (&banner.phase, &banner.alert) {
        (BannerPhase::FadingIn { .. } | BannerPhase::Visible { .. }, Some(alert))
            if banner.generation != *shown =>
        {
            *shown = banner.generation;
            Some(format!("!!! {}", alert.message.replace('\n', " | ")))
        }
        (BannerPhase::Hidden, _) if banner.generation > 0 => Some("(alert dismissed)".to_string()),
        _ => None,
    }
}

fn event_stream(mut rx: broadcast::Receiver<SessionEvent>) -> impl Stream<Item = SessionEvent> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => yield event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind the session");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

pub struct Console<'a> {
    handle: &'a MonitorHandle,
    token: String,
    selected: i64,
}

impl<'a> Console<'a> {
    pub fn new(handle: &'a MonitorHandle, token: String, selected: i64) -> Self {
        Self {
            handle,
            token,
            selected,
        }
    }

    fn print_selected(&self) {
        let selection = self.handle.snap_horizon(self.selected);
        let reading = self.handle.read_horizon(self.selected);
        println!("{}", render_reading(selection.horizon_seconds, &reading));
    }

    async fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Select(secs) => {
                let selection = self.handle.snap_horizon(secs);
                if selection.clamped {
                    println!("horizon {}s out of range, using {}s", secs, selection.horizon_seconds);
                }
                self.selected = secs;
                self.print_selected();
            }
            Command::Forecast(secs) => {
                if let Err(e) = self.handle.request_forecast(secs).await {
                    println!("forecast request failed: {}", e);
                }
            }
            Command::Reconnect => {
                if let Err(e) = self.handle.connect(&self.token).await {
                    println!("reconnect failed: {}", e);
                }
            }
            Command::Status => {
                let snapshot = self.handle.snapshot();
                println!("connection: {:?}", self.handle.connection_state());
                match &snapshot.inference {
                    InferenceStatus::Unavailable { reason } => println!("model: unavailable ({})", reason),
                    status => println!("model: {:?}", status),
                }
                self.print_selected();
            }
            Command::Unknown(line) => {
                println!("unknown command '{}' (try: <secs>, f <secs>, r, s, q)", line);
            }
        }
        true
    }

    /// Runs until `q`, end of input, or Ctrl-C.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut events = Box::pin(event_stream(self.handle.subscribe()));
        let mut connection = WatchStream::new(self.handle.subscribe_connection());
        let mut banner = WatchStream::new(self.handle.subscribe_banner());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut shown_banner = 0;

        self.print_selected();

        loop {
            tokio::select! {
                Some(event) = events.next() => {
                    if let Some(line) = render_event(&event) {
                        println!("{}", line);
                    }
                    if matches!(event, SessionEvent::InferenceCompleted(_)) {
                        self.print_selected();
                    }
                }
                Some(state) = connection.next() => {
                    println!("connection: {:?}", state);
                }
                Some(state) = banner.next() => {
                    if let Some(line) = render_banner(&state, &mut shown_banner) {
                        println!("{}", line);
                    }
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if let Some(command) = parse_command(&line) {
                        if !self.execute(command).await {
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    break;
                }
            }
        }

        Ok(())
    }
}
