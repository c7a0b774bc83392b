use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::snapshot::Coupon;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    FirstSeen,
    PriceChanged,
    CouponChanged,
    Unchanged,
    ExtractionFailed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Increased,
    Decreased,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObservedValue {
    Price(Decimal),
    Coupons(Vec<Coupon>),
}

impl ObservedValue {
    pub fn as_price(&self) -> Option<Decimal> {
        match self {
            Self::Price(price) => Some(*price),
            Self::Coupons(_) => None,
        }
    }
}

/// A classified difference between a fresh snapshot and the recorded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub item_id: String,
    /// Product title taken from the snapshot, used as the message label.
    pub title: Option<String>,
    pub old: Option<ObservedValue>,
    pub new: Option<ObservedValue>,
    pub at: DateTime<Utc>,
    /// Why extraction failed, for `ExtractionFailed` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChangeEvent {
    /// Direction of a price movement; `Unchanged` for every non-price event.
    pub fn direction(&self) -> ChangeType {
        let old = self.old.as_ref().and_then(ObservedValue::as_price);
        let new = self.new.as_ref().and_then(ObservedValue::as_price);
        match (old, new) {
            (Some(old), Some(new)) if new > old => ChangeType::Increased,
            (Some(old), Some(new)) if new < old => ChangeType::Decreased,
            _ => ChangeType::Unchanged,
        }
    }

    pub fn new_price(&self) -> Option<Decimal> {
        self.new.as_ref().and_then(ObservedValue::as_price)
    }

    pub fn old_price(&self) -> Option<Decimal> {
        self.old.as_ref().and_then(ObservedValue::as_price)
    }
}
