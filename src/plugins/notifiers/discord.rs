use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::models::{ChangeEvent, ChangeKind, ChangeType, ObservedValue};
use crate::plugins::traits::{NotificationPayload, NotificationTransport};
use crate::utils::error::NotificationError;

const TRANSPORT: &str = "discord";

pub struct DiscordTransport {
    client: Client,
    webhook_url: String,
    username: Option<String>,
    avatar_url: Option<String>,
}

impl DiscordTransport {
    pub fn new(webhook_url: &str, username: Option<String>, avatar_url: Option<String>) -> Self {
        DiscordTransport {
            client: Client::new(),
            webhook_url: webhook_url.to_string(),
            username,
            avatar_url,
        }
    }

    fn get_embed_color(&self, event: &ChangeEvent) -> u32 {
        match (event.kind, event.direction()) {
            (ChangeKind::ExtractionFailed, _) => 0xff0000, // Red for failures
            (_, ChangeType::Decreased) => 0x00ff00, // Green for price drops
            (_, ChangeType::Increased) => 0xff9900, // Orange for price increases
            (_, ChangeType::Unchanged) => 0x0099ff, // Blue for general updates
        }
    }

    fn get_emoji(&self, event: &ChangeEvent) -> &str {
        match (event.kind, event.direction()) {
            (ChangeKind::ExtractionFailed, _) => "⚠️",
            (ChangeKind::CouponChanged, _) => "🎟️",
            (_, ChangeType::Decreased) => "📉",
            (_, ChangeType::Increased) => "📈",
            (_, ChangeType::Unchanged) => "📊",
        }
    }

    fn describe(value: Option<&ObservedValue>) -> String {
        match value {
            Some(ObservedValue::Price(price)) => format!("¥{}", price),
            Some(ObservedValue::Coupons(coupons)) if coupons.is_empty() => "none".to_string(),
            Some(ObservedValue::Coupons(coupons)) => coupons
                .iter()
                .map(|c| match c.threshold {
                    Some(threshold) => format!("满{}减{}", threshold, c.face_value),
                    None => format!("减{}", c.face_value),
                })
                .collect::<Vec<_>>()
                .join(", "),
            None => "-".to_string(),
        }
    }

    fn create_embed(&self, event: &ChangeEvent, payload: &NotificationPayload) -> serde_json::Value {
        let heading = match payload {
            NotificationPayload::PriceChange { title, .. } | NotificationPayload::CouponChange { title, .. } => {
                title.clone()
            }
            NotificationPayload::Failure { .. } => format!("Item {}", event.item_id),
        };

        let mut embed = json!({
            "title": format!("{} {}", self.get_emoji(event), heading),
            "color": self.get_embed_color(event),
            "timestamp": event.at.to_rfc3339(),
            "fields": []
        });

        let change_title = match (event.kind, event.direction()) {
            (ChangeKind::FirstSeen, _) => "🆕 Tracking Started",
            (ChangeKind::CouponChanged, _) => "🎟️ Coupons Changed",
            (ChangeKind::ExtractionFailed, _) => "⚠️ Extraction Failed",
            (_, ChangeType::Decreased) => "💰 Price Drop!",
            (_, ChangeType::Increased) => "⚠️ Price Increase",
            (_, ChangeType::Unchanged) => "📊 Update",
        };

        let value = match payload {
            NotificationPayload::Failure { exception } => exception.clone(),
            _ => format!(
                "**Old:** {}\n**New:** {}",
                Self::describe(event.old.as_ref()),
                Self::describe(event.new.as_ref())
            ),
        };

        if let Some(fields) = embed["fields"].as_array_mut() {
            fields.push(json!({
                "name": change_title,
                "value": value,
                "inline": false
            }));
            fields.push(json!({
                "name": "🏷️ Item",
                "value": event.item_id,
                "inline": true
            }));
        }

        embed["footer"] = json!({
            "text": "SKU Watcher"
        });

        embed
    }

    fn create_webhook_payload(&self, event: &ChangeEvent, payload: &NotificationPayload) -> serde_json::Value {
        let mut body = json!({
            "embeds": [self.create_embed(event, payload)]
        });

        if let Some(username) = &self.username {
            body["username"] = json!(username);
        }

        if let Some(avatar_url) = &self.avatar_url {
            body["avatar_url"] = json!(avatar_url);
        }

        body
    }
}

#[async_trait]
impl NotificationTransport for DiscordTransport {
    fn name(&self) -> &'static str {
        TRANSPORT
    }

    async fn send(&self, event: &ChangeEvent, payload: &NotificationPayload) -> Result<(), NotificationError> {
        let body = self.create_webhook_payload(event, payload);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotificationError::Transport {
                transport: TRANSPORT.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotificationError::Rejected {
                transport: TRANSPORT.to_string(),
                status: response.status().as_u16(),
            });
        }

        debug!(item_id = %event.item_id, "Discord message delivered");
        Ok(())
    }
}
