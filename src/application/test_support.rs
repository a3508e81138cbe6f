// Test doubles for the application traits
use crate::application::frame_transport::{FrameLink, FrameTransport};
use crate::application::notification_dispatcher::NotificationDispatcher;
use crate::application::prediction_service::PredictionService;
use crate::domain::error::ConnectionError;
use crate::domain::telemetry::{ClassifierFeatures, Granularity};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub struct ScriptedLink {
    inbound: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FrameLink for ScriptedLink {
    async fn next_frame(&mut self) -> Option<Result<String, ConnectionError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// Hands out queued links; refuses the handshake once the queue is empty.
#[derive(Default)]
pub struct ScriptedTransport {
    opens: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
    links: Mutex<VecDeque<ScriptedLink>>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    /// Queue a link for the next `open`; dropping the sender closes it.
    pub fn push_link(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.lock().unwrap().push_back(ScriptedLink {
            inbound: rx,
            sent: self.sent.clone(),
        });
        tx
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameTransport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<Box<dyn FrameLink>, ConnectionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        match self.links.lock().unwrap().pop_front() {
            Some(link) => Ok(Box::new(link)),
            None => Err(ConnectionError::Handshake("refused".to_string())),
        }
    }
}

/// Answers classify calls from a queue of clusters and records every call.
#[derive(Default)]
pub struct FakeModels {
    clusters: Mutex<VecDeque<i64>>,
    forecast: Option<f64>,
    pub classify_calls: Mutex<Vec<ClassifierFeatures>>,
    pub sequences: Mutex<Vec<Vec<[f64; 7]>>>,
}

impl FakeModels {
    /// `forecast: None` makes every sequence prediction fail.
    pub fn new(clusters: &[i64], forecast: Option<f64>) -> Self {
        Self {
            clusters: Mutex::new(clusters.iter().copied().collect()),
            forecast,
            ..Default::default()
        }
    }

    pub fn classify_count(&self) -> usize {
        self.classify_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PredictionService for FakeModels {
    async fn classify(&self, _range: Granularity, features: &ClassifierFeatures) -> anyhow::Result<i64> {
        self.classify_calls.lock().unwrap().push(features.clone());
        self.clusters
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("classifier unavailable"))
    }

    async fn predict_sequence(&self, _range: Granularity, sequence: &[[f64; 7]]) -> anyhow::Result<f64> {
        self.sequences.lock().unwrap().push(sequence.to_vec());
        self.forecast
            .ok_or_else(|| anyhow::anyhow!("predictor unavailable"))
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, title: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        if self.fail {
            anyhow::bail!("notifications disabled");
        }
        Ok(())
    }
}
