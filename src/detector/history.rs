use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Coupon;
use crate::store;
use crate::utils::error::Result;

/// The last accepted observation of one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub last_price: Decimal,
    #[serde(default)]
    pub last_coupons: Vec<Coupon>,
    pub updated_at: DateTime<Utc>,
}

/// History file keyed by item id. Read once at start, rewritten whole on change.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<BTreeMap<String, HistoryEntry>> {
        Ok(store::load_json(&self.path).await?.unwrap_or_default())
    }

    pub async fn save(&self, entries: &BTreeMap<String, HistoryEntry>) -> Result<()> {
        store::save_json(&self.path, entries).await
    }
}
