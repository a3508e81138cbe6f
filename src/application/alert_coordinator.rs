// Alert coordinator - Push notification plus a timed, replaceable in-app banner
use crate::application::notification_dispatcher::NotificationDispatcher;
use crate::domain::alert::{AlertEvent, AlertSignal, ALERT_TITLE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_DISPLAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_FADE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerPhase {
    Hidden,
    /// Appearing; the display window already runs until `until`.
    FadingIn { until: Instant },
    /// Fully shown until `until`, then fades out.
    Visible { until: Instant },
    FadingOut,
}

impl BannerPhase {
    /// Start of the fade-out, while the banner is fading in or fully shown.
    pub fn until(&self) -> Option<Instant> {
        match self {
            Self::FadingIn { until } | Self::Visible { until } => Some(*until),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BannerState {
    pub phase: BannerPhase,
    pub alert: Option<AlertEvent>,
    /// Bumped on every new banner; a dismiss timer only acts on its own generation.
    pub generation: u64,
}

impl Default for BannerState {
    fn default() -> Self {
        Self {
            phase: BannerPhase::Hidden,
            alert: None,
            generation: 0,
        }
    }
}

pub struct AlertCoordinator {
    dispatcher: Arc<dyn NotificationDispatcher>,
    display: Duration,
    fade: Duration,
    banner: Arc<watch::Sender<BannerState>>,
    dismiss: Mutex<Option<JoinHandle<()>>>,
}

impl AlertCoordinator {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, display: Duration, fade: Duration) -> Self {
        let (banner, _) = watch::channel(BannerState::default());
        Self {
            dispatcher,
            display,
            fade,
            banner: Arc::new(banner),
            dismiss: Mutex::new(None),
        }
    }

    pub fn banner(&self) -> BannerState {
        self.banner.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BannerState> {
        self.banner.subscribe()
    }

    /// Notify the user now and show (or replace) the banner for a full display window.
    pub async fn raise(&self, signal: &AlertSignal) -> AlertEvent {
        let event = AlertEvent::from_signal(signal, self.display);

        if let Err(e) = self.dispatcher.dispatch(ALERT_TITLE, &signal.compose_body()).await {
            tracing::warn!(error = %e, "Notification dispatch failed");
        }

        self.show(event.clone()).await;
        event
    }

    async fn show(&self, event: AlertEvent) {
        let mut dismiss = self.dismiss.lock().await;

        // The stale timer goes first, or it would cut the new banner short.
        if let Some(stale) = dismiss.take() {
            stale.abort();
        }

        let until = Instant::now() + self.display;
        let mut generation = 0;
        self.banner.send_modify(|banner| {
            banner.generation += 1;
            generation = banner.generation;
            banner.phase = BannerPhase::FadingIn { until };
            banner.alert = Some(event);
        });
        tracing::info!(generation, "Alert banner shown");

        let banner = self.banner.clone();
        let fade = self.fade;
        *dismiss = Some(tokio::spawn(async move {
            tokio::time::sleep(fade).await;
            if !move_phase(&banner, generation, BannerPhase::Visible { until }) {
                return;
            }
            tokio::time::sleep_until(until).await;
            if !move_phase(&banner, generation, BannerPhase::FadingOut) {
                return;
            }
            tokio::time::sleep(fade).await;
            move_phase(&banner, generation, BannerPhase::Hidden);
        }));
    }

    /// Cancel any pending dismiss timer and hide the banner at once.
    pub async fn shutdown(&self) {
        if let Some(pending) = self.dismiss.lock().await.take() {
            pending.abort();
        }
        self.banner.send_modify(|banner| {
            banner.phase = BannerPhase::Hidden;
            banner.alert = None;
        });
    }
}

fn move_phase(banner: &watch::Sender<BannerState>, generation: u64, phase: BannerPhase) -> bool {
    banner.send_if_modified(|state| {
        if state.generation != generation {
            return false;
        }
        state.phase = phase;
        if phase == BannerPhase::Hidden {
            state.alert = None;
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::RecordingDispatcher;
    use crate::domain::telemetry::ConsumptionLevel;
    use chrono::Utc;
    use tokio::time::sleep;

    fn signal(volume: f64) -> AlertSignal {
        AlertSignal {
            horizon_seconds: 60,
            forecast_volume_liters: volume,
            forecast_level: ConsumptionLevel::High,
            active_seconds: 30.0,
            raised_at: Utc::now(),
        }
    }

    fn coordinator(dispatcher: Arc<RecordingDispatcher>) -> AlertCoordinator {
        AlertCoordinator::new(dispatcher, DEFAULT_DISPLAY, DEFAULT_FADE)
    }

    fn remaining(state: &BannerState) -> Duration {
        match state.phase.until() {
            Some(until) => until - Instant::now(),
            None => panic!("banner not shown: {:?}", state.phase),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_lifecycle() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let alerts = coordinator(dispatcher.clone());

        let event = alerts.raise(&signal(8.0)).await;
        assert_eq!(event.level, ConsumptionLevel::High);
        assert_eq!(alerts.banner().alert, Some(event));
        assert!(matches!(alerts.banner().phase, BannerPhase::FadingIn { .. }));
        assert_eq!(dispatcher.sent.lock().unwrap()[0].0, ALERT_TITLE);

        sleep(DEFAULT_FADE + Duration::from_millis(1)).await;
        assert!(matches!(alerts.banner().phase, BannerPhase::Visible { .. }));
        assert_eq!(
            remaining(&alerts.banner()),
            DEFAULT_DISPLAY - DEFAULT_FADE - Duration::from_millis(1)
        );

        sleep(DEFAULT_DISPLAY - DEFAULT_FADE - Duration::from_millis(2)).await;
        assert!(matches!(alerts.banner().phase, BannerPhase::Visible { .. }));

        sleep(Duration::from_millis(2)).await;
        assert_eq!(alerts.banner().phase, BannerPhase::FadingOut);

        sleep(DEFAULT_FADE).await;
        let banner = alerts.banner();
        assert_eq!(banner.phase, BannerPhase::Hidden);
        assert_eq!(banner.alert, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_alert_restarts_full_window() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let alerts = coordinator(dispatcher.clone());

        alerts.raise(&signal(1.0)).await;
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(remaining(&alerts.banner()), Duration::from_millis(4000));

        alerts.raise(&signal(2.0)).await;
        assert_eq!(remaining(&alerts.banner()), DEFAULT_DISPLAY);

        // Past the first banner's deadline: the stale timer must not fire.
        sleep(Duration::from_millis(4500)).await;
        let banner = alerts.banner();
        assert!(matches!(banner.phase, BannerPhase::Visible { .. }));
        assert!(banner.alert.unwrap().message.contains("2.00 liters"));

        sleep(Duration::from_millis(600)).await;
        assert_eq!(alerts.banner().phase, BannerPhase::FadingOut);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_still_shows_banner() {
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let alerts = coordinator(dispatcher);

        alerts.raise(&signal(3.0)).await;
        assert!(alerts.banner().phase.until().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_dismiss_timer() {
        let alerts = coordinator(Arc::new(RecordingDispatcher::default()));
        alerts.raise(&signal(3.0)).await;
        let generation = alerts.banner().generation;

        alerts.shutdown().await;
        assert_eq!(alerts.banner().phase, BannerPhase::Hidden);

        sleep(DEFAULT_DISPLAY * 2).await;
        let banner = alerts.banner();
        assert_eq!(banner.phase, BannerPhase::Hidden);
        assert_eq!(banner.generation, generation);
    }
}
