use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::ChangeEvent;
use crate::utils::error::NotificationError;

/// The body posted for one change event. The three shapes are told apart by
/// their keys, not by a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    PriceChange {
        id: String,
        title: String,
        price: Decimal,
        /// Short human-readable description of the movement.
        status: String,
    },
    CouponChange {
        id: String,
        title: String,
    },
    Failure {
        exception: String,
    },
}

/// Somewhere a notification can be posted to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &ChangeEvent, payload: &NotificationPayload) -> Result<(), NotificationError>;
}
