// Connection manager - One persistent streaming connection with fixed-delay reconnect
use crate::application::frame_transport::{FrameLink, FrameTransport};
use crate::domain::error::ConnectionError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;

const OUTBOUND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Owns the socket and the reconnect timer for one session.
///
/// Inbound text frames are forwarded, in receipt order, to the `frames` channel
/// given at construction. State changes are published on a watch channel.
pub struct ConnectionManager {
    transport: Arc<dyn FrameTransport>,
    endpoint: String,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    frames: mpsc::Sender<String>,
    runner: Mutex<Option<Runner>>,
}

struct Runner {
    shutdown: watch::Sender<bool>,
    outbound: mpsc::Sender<String>,
    retry_now: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn FrameTransport>,
        endpoint: impl Into<String>,
        reconnect_delay: Duration,
        frames: mpsc::Sender<String>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            endpoint: endpoint.into(),
            reconnect_delay,
            state: Arc::new(state),
            frames,
            runner: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start the connection. A no-op while `Connecting` or `Connected`;
    /// while `Reconnecting` it cuts the remaining backoff short.
    pub async fn connect(&self, token: &str) -> Result<(), ConnectionError> {
        if token.is_empty() {
            tracing::warn!("No token available, not connecting");
            return Err(ConnectionError::MissingToken);
        }

        let mut runner = self.runner.lock().await;

        match self.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                tracing::debug!(state = ?self.state(), "Connect ignored, connection already active");
                return Ok(());
            }
            ConnectionState::Reconnecting => {
                if let Some(active) = runner.as_ref() {
                    tracing::info!("Manual reconnect, skipping remaining backoff");
                    active.retry_now.notify_one();
                }
                return Ok(());
            }
            ConnectionState::Disconnected => {}
        }

        self.state.send_replace(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.endpoint, "Connecting to stream");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let retry_now = Arc::new(Notify::new());

        let task = ConnectionTask {
            transport: self.transport.clone(),
            url: build_url(&self.endpoint, token),
            reconnect_delay: self.reconnect_delay,
            state: self.state.clone(),
            frames: self.frames.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            retry_now: retry_now.clone(),
        };

        *runner = Some(Runner {
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            retry_now,
            handle: tokio::spawn(task.run()),
        });

        Ok(())
    }

    /// Queue a frame for the server. Fails unless the link is open.
    pub async fn send(&self, frame: String) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }

        let outbound = {
            let runner = self.runner.lock().await;
            runner
                .as_ref()
                .map(|active| active.outbound.clone())
                .ok_or(ConnectionError::NotConnected)?
        };

        outbound
            .send(frame)
            .await
            .map_err(|_| ConnectionError::NotConnected)
    }

    /// Close the connection for good. Safe from any state.
    pub async fn teardown(&self) {
        let mut runner = self.runner.lock().await;

        // Must precede the close: the task treats a close seen in any other
        // state as a dropped link and would schedule a reconnect.
        let previous = self.state.send_replace(ConnectionState::Disconnected);

        if let Some(active) = runner.take() {
            active.shutdown.send_replace(true);
            if let Err(e) = active.handle.await {
                tracing::warn!(error = %e, "Connection task ended abnormally");
            }
        }

        tracing::info!(?previous, "Connection torn down");
    }
}

fn build_url(endpoint: &str, token: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", endpoint, separator, urlencoding::encode(token))
}

/// Move to `next` unless the session was torn down. Returns false after teardown.
fn advance(state: &watch::Sender<ConnectionState>, next: ConnectionState) -> bool {
    let mut live = false;
    state.send_if_modified(|current| {
        if *current == ConnectionState::Disconnected {
            return false;
        }
        live = true;
        let changed = *current != next;
        *current = next;
        changed
    });
    live
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

enum LinkEnd {
    Shutdown,
    Abandoned,
    Closed,
    Failed(ConnectionError),
}

struct ConnectionTask {
    transport: Arc<dyn FrameTransport>,
    url: String,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    frames: mpsc::Sender<String>,
    outbound: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
    retry_now: Arc<Notify>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            let opened = tokio::select! {
                opened = self.transport.open(&self.url) => opened,
                _ = shutdown_requested(&mut self.shutdown) => return,
            };

            match opened {
                Ok(mut link) => {
                    if !advance(&self.state, ConnectionState::Connected) {
                        let _ = link.close().await;
                        return;
                    }
                    tracing::info!("Stream connected");

                    match self.pump(link.as_mut()).await {
                        LinkEnd::Shutdown => {
                            if let Err(e) = link.close().await {
                                tracing::debug!(error = %e, "Close after teardown failed");
                            }
                            return;
                        }
                        LinkEnd::Abandoned => {
                            tracing::warn!("Frame consumer is gone, closing stream");
                            self.state.send_replace(ConnectionState::Disconnected);
                            let _ = link.close().await;
                            return;
                        }
                        LinkEnd::Closed => tracing::warn!("Stream closed by server"),
                        LinkEnd::Failed(e) => tracing::warn!(error = %e, "Stream failed"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Connection attempt failed"),
            }

            if !advance(&self.state, ConnectionState::Reconnecting) {
                return;
            }
            tracing::info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnect scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = self.retry_now.notified() => {}
                _ = shutdown_requested(&mut self.shutdown) => return,
            }

            if !advance(&self.state, ConnectionState::Connecting) {
                return;
            }
        }
    }

    async fn pump(&mut self, link: &mut dyn FrameLink) -> LinkEnd {
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut self.shutdown) => return LinkEnd::Shutdown,
                inbound = link.next_frame() => match inbound {
                    Some(Ok(frame)) => {
                        tokio::select! {
                            sent = self.frames.send(frame) => {
                                if sent.is_err() {
                                    return LinkEnd::Abandoned;
                                }
                            }
                            _ = shutdown_requested(&mut self.shutdown) => return LinkEnd::Shutdown,
                        }
                    }
                    Some(Err(e)) => return LinkEnd::Failed(e),
                    None => return LinkEnd::Closed,
                },
                Some(frame) = self.outbound.recv() => {
                    if let Err(e) = link.send(frame).await {
                        return LinkEnd::Failed(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::ScriptedTransport;
    use tokio::time::{sleep, Instant};

    const DELAY: Duration = Duration::from_millis(5000);

    fn manager(transport: Arc<ScriptedTransport>) -> (ConnectionManager, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(32);
        let manager = ConnectionManager::new(transport, "wss://example.test/ws", DELAY, tx);
        (manager, rx)
    }

    async fn wait_for_state(manager: &ConnectionManager, wanted: ConnectionState) {
        let mut rx = manager.subscribe();
        rx.wait_for(|s| *s == wanted).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_forwards_frames_in_order() {
        let transport = Arc::new(ScriptedTransport::default());
        let link = transport.push_link();
        let (manager, mut frames) = manager(transport.clone());

        manager.connect("abc def").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        link.send("one".to_string()).unwrap();
        link.send("two".to_string()).unwrap();
        assert_eq!(frames.recv().await.unwrap(), "one");
        assert_eq!(frames.recv().await.unwrap(), "two");

        assert_eq!(
            transport.urls.lock().unwrap()[0],
            "wss://example.test/ws?token=abc%20def"
        );
        manager.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_is_noop() {
        let transport = Arc::new(ScriptedTransport::default());
        let _link = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.connect("t").await.unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
        manager.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_schedules_one_reconnect_after_delay() {
        let transport = Arc::new(ScriptedTransport::default());
        let first = transport.push_link();
        let _second = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        drop(first);
        wait_for_state(&manager, ConnectionState::Reconnecting).await;
        assert_eq!(transport.opens(), 1);

        sleep(DELAY - Duration::from_millis(1)).await;
        assert_eq!(transport.opens(), 1);

        sleep(Duration::from_millis(2)).await;
        wait_for_state(&manager, ConnectionState::Connected).await;
        assert_eq!(transport.opens(), 2);

        sleep(DELAY * 3).await;
        assert_eq!(transport.opens(), 2);
        manager.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_backoff_prevents_reconnect() {
        let transport = Arc::new(ScriptedTransport::default());
        let first = transport.push_link();
        let _second = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        drop(first);
        wait_for_state(&manager, ConnectionState::Reconnecting).await;

        sleep(DELAY / 2).await;
        manager.teardown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        sleep(DELAY * 4).await;
        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_while_connected_does_not_reconnect() {
        let transport = Arc::new(ScriptedTransport::default());
        let _link = transport.push_link();
        let _spare = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        manager.teardown().await;
        sleep(DELAY * 2).await;

        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_with_stalled_consumer() {
        let transport = Arc::new(ScriptedTransport::default());
        let link = transport.push_link();
        let (tx, _frames) = mpsc::channel(1);
        let manager = ConnectionManager::new(transport.clone(), "wss://example.test/ws", DELAY, tx);

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        // Nobody reads: the first frame fills the channel and the next one blocks the task.
        for frame in ["one", "two", "three"] {
            link.send(frame.to_string()).unwrap();
        }
        sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_secs(1), manager.teardown())
            .await
            .expect("teardown must not wait on the frame consumer");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshake_keeps_retrying() {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Reconnecting).await;
        assert_eq!(transport.opens(), 1);

        sleep(DELAY * 2 + Duration::from_millis(1)).await;
        assert_eq!(transport.opens(), 3);
        manager.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_connect_skips_backoff() {
        let transport = Arc::new(ScriptedTransport::default());
        let first = transport.push_link();
        let _second = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;
        drop(first);
        wait_for_state(&manager, ConnectionState::Reconnecting).await;

        let started = Instant::now();
        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;

        assert!(started.elapsed() < DELAY);
        assert_eq!(transport.opens(), 2);
        manager.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open_connection() {
        let transport = Arc::new(ScriptedTransport::default());
        let _link = transport.push_link();
        let (manager, _frames) = manager(transport.clone());

        assert_eq!(
            manager.send("early".to_string()).await,
            Err(ConnectionError::NotConnected)
        );

        manager.connect("t").await.unwrap();
        wait_for_state(&manager, ConnectionState::Connected).await;
        manager.send("hello".to_string()).await.unwrap();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(*transport.sent.lock().unwrap(), vec!["hello".to_string()]);
        manager.teardown().await;
    }

    #[tokio::test]
    async fn test_missing_token() {
        let transport = Arc::new(ScriptedTransport::default());
        let (manager, _frames) = manager(transport.clone());

        assert_eq!(manager.connect("").await, Err(ConnectionError::MissingToken));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.opens(), 0);
    }
}
