use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::models::Notification;

/// Out-of-band delivery (email, SMS, push) for a stored notification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDelivery: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Records the delivery in the log only; real channels are external.
pub struct LogDelivery;

#[async_trait]
impl NotificationDelivery for LogDelivery {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            kind = %notification.kind,
            "Notification queued for delivery: {}", notification.title
        );
        Ok(())
    }
}
