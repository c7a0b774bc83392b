use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry of the coupon list shown next to the price, e.g. "满199减20".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coupon {
    pub face_value: Decimal,
    /// Minimum spend before the coupon applies; `None` for unconditional ones.
    pub threshold: Option<Decimal>,
    pub expiry: Option<NaiveDate>,
}

/// The record produced by a single extraction pass over a single page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub plus_price: Option<Decimal>,
    pub subtitle: Option<String>,
    pub has_coupon: bool,
    pub coupons: Vec<Coupon>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            name: None,
            price: None,
            plus_price: None,
            subtitle: None,
            has_coupon: false,
            coupons: Vec::new(),
            captured_at,
        }
    }

    /// No field could be read at all; upstream treats this as a failed extraction.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.plus_price.is_none()
            && self.subtitle.is_none()
    }

    pub fn extracted_fields(&self) -> usize {
        [
            self.name.is_some(),
            self.price.is_some(),
            self.plus_price.is_some(),
            self.subtitle.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}
