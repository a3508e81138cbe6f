// Notification dispatcher trait - Local push notifications
use async_trait::async_trait;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Show a notification right away.
    async fn dispatch(&self, title: &str, body: &str) -> anyhow::Result<()>;
}
