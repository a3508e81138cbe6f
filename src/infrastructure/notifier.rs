// Notification dispatchers - Log-based local notifications and an optional webhook
use crate::application::notification_dispatcher::NotificationDispatcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Surfaces notifications on the `notification` tracing target.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn dispatch(&self, title: &str, body: &str) -> Result<()> {
        tracing::warn!(target: "notification", title, body = %body.replace('\n', " | "));
        Ok(())
    }
}

/// Posts `{title, body}` to a push relay, and logs it as well.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook client")?;

        Ok(Self { http, url })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn dispatch(&self, title: &str, body: &str) -> Result<()> {
        LogNotifier.dispatch(title, body).await?;

        let response = self
            .http
            .post(&self.url)
            .json(&WebhookPayload { title, body })
            .send()
            .await
            .context("Failed to reach notification webhook")?;

        if !response.status().is_success() {
            anyhow::bail!("Notification webhook answered {}", response.status());
        }
        Ok(())
    }
}
