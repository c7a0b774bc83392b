//! Turns change events into outbound messages.
//!
//! Delivery is best effort: every configured transport gets one try per
//! event, failures are logged and counted, and nothing is retried or fed
//! back into the change history.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::NotificationsConfig;
use crate::models::{ChangeEvent, ChangeKind, ChangeType};
use crate::plugins::notifiers::{DiscordTransport, LogTransport, WebhookTransport};
use crate::plugins::traits::{NotificationPayload, NotificationTransport};
use crate::utils::error::{ExtractionError, Result};

/// Short description of a price movement, e.g. `up ¥20 (100 → 120)`.
pub fn price_status(event: &ChangeEvent) -> Option<String> {
    let new = event.new_price()?;
    if event.kind == ChangeKind::FirstSeen {
        return Some(format!("tracking started at ¥{}", new));
    }
    let old = event.old_price()?;
    let word = match event.direction() {
        ChangeType::Increased => "up",
        ChangeType::Decreased => "down",
        ChangeType::Unchanged => return None,
    };
    Some(format!("{} ¥{} ({} → {})", word, (new - old).abs(), old, new))
}

/// The message for `event`, or `None` for kinds that are not announced.
pub fn payload_for(event: &ChangeEvent) -> Option<NotificationPayload> {
    let title = event.title.clone().unwrap_or_else(|| event.item_id.clone());
    match event.kind {
        ChangeKind::FirstSeen | ChangeKind::PriceChanged => Some(NotificationPayload::PriceChange {
            id: event.item_id.clone(),
            title,
            price: event.new_price()?,
            status: price_status(event)?,
        }),
        ChangeKind::CouponChanged => Some(NotificationPayload::CouponChange {
            id: event.item_id.clone(),
            title,
        }),
        ChangeKind::ExtractionFailed => Some(NotificationPayload::Failure {
            exception: event.reason.clone().unwrap_or_else(|| {
                ExtractionError::MissingPrice {
                    item_id: event.item_id.clone(),
                }
                .to_string()
            }),
        }),
        ChangeKind::Unchanged => None,
    }
}

pub struct Notifier {
    transports: Vec<Box<dyn NotificationTransport>>,
}

impl Notifier {
    pub fn new(transports: Vec<Box<dyn NotificationTransport>>) -> Self {
        Self { transports }
    }

    pub fn from_config(config: &NotificationsConfig) -> Result<Self> {
        let mut transports: Vec<Box<dyn NotificationTransport>> = Vec::new();

        if let Some(webhook) = &config.webhook {
            transports.push(Box::new(WebhookTransport::new(
                &webhook.url,
                webhook.bearer_token.clone(),
                Duration::from_secs(webhook.timeout_secs),
            )?));
        }
        if let Some(discord) = &config.discord {
            transports.push(Box::new(DiscordTransport::new(
                &discord.webhook_url,
                Some(discord.username.clone()),
                discord.avatar_url.clone(),
            )));
        }
        if config.log || transports.is_empty() {
            transports.push(Box::new(LogTransport));
        }

        info!(
            transports = ?transports.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "Notifier ready"
        );
        Ok(Self::new(transports))
    }

    pub fn transport_names(&self) -> Vec<&'static str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Sends `event` through every transport. Returns how many accepted it.
    pub async fn deliver(&self, event: &ChangeEvent) -> usize {
        let Some(payload) = payload_for(event) else {
            debug!(item_id = %event.item_id, kind = ?event.kind, "Nothing to announce");
            return 0;
        };

        let mut delivered = 0;
        for transport in &self.transports {
            match transport.send(event, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    metrics::counter!("sku_watcher_notification_failures_total", "transport" => transport.name())
                        .increment(1);
                    warn!(
                        item_id = %event.item_id,
                        transport = transport.name(),
                        "Notification failed: {}", e
                    );
                }
            }
        }
        delivered
    }
}
