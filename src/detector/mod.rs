//! Compares fresh snapshots with what was seen before.
//!
//! [`classify`] is a pure function of the snapshot and the stored entry, so
//! repeating a cycle with the same page gives the same events. The detector
//! only writes history after a snapshot with a price; failed extractions
//! never touch it.

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::models::{ChangeEvent, ChangeKind, ObservedValue, Snapshot};
use crate::utils::error::Result;

pub mod history;

pub use history::{HistoryEntry, HistoryStore};

/// Events for one snapshot: exactly one of `ExtractionFailed`, `FirstSeen`
/// or `Unchanged`, or else a `PriceChanged` and/or a `CouponChanged`.
pub fn classify(item_id: &str, snapshot: &Snapshot, entry: Option<&HistoryEntry>) -> Vec<ChangeEvent> {
    let event = |kind: ChangeKind, old: Option<ObservedValue>, new: Option<ObservedValue>| ChangeEvent {
        kind,
        item_id: item_id.to_string(),
        title: snapshot.name.clone(),
        old,
        new,
        at: snapshot.captured_at,
        reason: None,
    };

    let Some(price) = snapshot.price else {
        let old = entry.map(|e| ObservedValue::Price(e.last_price));
        return vec![event(ChangeKind::ExtractionFailed, old, None)];
    };

    let Some(entry) = entry else {
        return vec![event(ChangeKind::FirstSeen, None, Some(ObservedValue::Price(price)))];
    };

    let mut events = Vec::new();
    if price != entry.last_price {
        events.push(event(
            ChangeKind::PriceChanged,
            Some(ObservedValue::Price(entry.last_price)),
            Some(ObservedValue::Price(price)),
        ));
    }
    if snapshot.coupons != entry.last_coupons {
        events.push(event(
            ChangeKind::CouponChanged,
            Some(ObservedValue::Coupons(entry.last_coupons.clone())),
            Some(ObservedValue::Coupons(snapshot.coupons.clone())),
        ));
    }
    if events.is_empty() {
        events.push(event(ChangeKind::Unchanged, None, Some(ObservedValue::Price(price))));
    }
    events
}

/// The history entry to store after `events`, or `None` when it stays as is.
pub fn updated_entry(snapshot: &Snapshot, entry: Option<&HistoryEntry>, events: &[ChangeEvent]) -> Option<HistoryEntry> {
    let price = snapshot.price?;
    let changed = events.iter().any(|e| {
        matches!(
            e.kind,
            ChangeKind::FirstSeen | ChangeKind::PriceChanged | ChangeKind::CouponChanged
        )
    });
    if !changed {
        return None;
    }

    let mut next = entry.cloned().unwrap_or(HistoryEntry {
        last_price: price,
        last_coupons: Vec::new(),
        updated_at: snapshot.captured_at,
    });
    next.last_price = price;
    next.last_coupons = snapshot.coupons.clone();
    next.updated_at = snapshot.captured_at;
    Some(next)
}

pub struct ChangeDetector {
    store: HistoryStore,
    entries: BTreeMap<String, HistoryEntry>,
}

impl ChangeDetector {
    pub async fn open(store: HistoryStore) -> Result<Self> {
        let entries = store.load().await?;
        info!(path = %store.path().display(), items = entries.len(), "Loaded price history");
        Ok(Self { store, entries })
    }

    pub fn entry(&self, item_id: &str) -> Option<&HistoryEntry> {
        self.entries.get(item_id)
    }

    /// Classifies `snapshot` and commits any resulting history change to disk
    /// before returning the events.
    pub async fn observe(&mut self, item_id: &str, snapshot: &Snapshot) -> Result<Vec<ChangeEvent>> {
        let entry = self.entries.get(item_id);
        let events = classify(item_id, snapshot, entry);

        if let Some(next) = updated_entry(snapshot, entry, &events) {
            self.entries.insert(item_id.to_string(), next);
            self.store.save(&self.entries).await?;
        }

        for event in &events {
            metrics::counter!("sku_watcher_change_events_total", "kind" => kind_label(event.kind)).increment(1);
            debug!(item_id, kind = ?event.kind, "Classified snapshot");
        }
        Ok(events)
    }
}

fn kind_label(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::FirstSeen => "first_seen",
        ChangeKind::PriceChanged => "price_changed",
        ChangeKind::CouponChanged => "coupon_changed",
        ChangeKind::Unchanged => "unchanged",
        ChangeKind::ExtractionFailed => "extraction_failed",
    }
}
