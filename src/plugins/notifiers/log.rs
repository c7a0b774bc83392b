use async_trait::async_trait;
use tracing::info;

use crate::models::ChangeEvent;
use crate::plugins::traits::{NotificationPayload, NotificationTransport};
use crate::utils::error::NotificationError;

/// Writes each message to the log. Used when no endpoint is configured.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &ChangeEvent, payload: &NotificationPayload) -> Result<(), NotificationError> {
        let body = serde_json::to_string(payload).map_err(|e| NotificationError::Transport {
            transport: "log".to_string(),
            message: e.to_string(),
        })?;
        info!(item_id = %event.item_id, kind = ?event.kind, "Notification: {}", body);
        Ok(())
    }
}
