use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::models::ChangeEvent;
use crate::plugins::traits::{NotificationPayload, NotificationTransport};
use crate::utils::error::{NotificationError, Result};

const TRANSPORT: &str = "webhook";

/// Posts the payload as-is to a JSON endpoint.
pub struct WebhookTransport {
    client: Client,
    url: String,
    bearer_token: Option<String>,
}

impl WebhookTransport {
    pub fn new(url: &str, bearer_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            bearer_token,
        })
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &'static str {
        TRANSPORT
    }

    async fn send(&self, event: &ChangeEvent, payload: &NotificationPayload) -> std::result::Result<(), NotificationError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| NotificationError::Transport {
            transport: TRANSPORT.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                transport: TRANSPORT.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(item_id = %event.item_id, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}
