//! Turns a loaded item page into a [`Snapshot`].
//!
//! Every field has an ordered list of [`FieldStrategy`] values. The first
//! strategy that yields a usable value decides the field; nothing after it is
//! consulted. A field nobody can read stays `None`. Extraction itself never
//! fails: a page that yields nothing becomes an empty snapshot and the caller
//! decides what that means.

use chrono::Utc;
use tracing::{debug, info};

use crate::models::{Coupon, Snapshot};
use crate::navigator::PageView;

pub mod coupon;
pub mod selectors;
pub mod strategy;

pub use strategy::{normalize_price, normalize_text, FieldStrategy, FieldValue, Pick, Rule};

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    name: Vec<FieldStrategy>,
    price: Vec<FieldStrategy>,
    plus_price: Vec<FieldStrategy>,
    subtitle: Vec<FieldStrategy>,
    coupon_containers: Vec<&'static str>,
    coupon_entries: Vec<&'static str>,
    reveal_script: Option<&'static str>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self {
            name: selectors::NAME.to_vec(),
            price: selectors::PRICE.to_vec(),
            plus_price: selectors::PLUS_PRICE.to_vec(),
            subtitle: selectors::SUBTITLE.to_vec(),
            coupon_containers: selectors::COUPON_CONTAINERS.to_vec(),
            coupon_entries: selectors::COUPON_ENTRIES.to_vec(),
            reveal_script: Some(selectors::PROMO_REVEAL_SCRIPT),
        }
    }
}

impl FieldExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn extract(&self, page: &PageView<'_>) -> Snapshot {
        let mut snapshot = Snapshot::empty(Utc::now());

        snapshot.name = first_winning(page, &self.name)
            .await
            .and_then(FieldValue::into_text);

        self.reveal_promotions(page).await;

        snapshot.price = first_winning(page, &self.price)
            .await
            .and_then(FieldValue::into_price);
        snapshot.plus_price = first_winning(page, &self.plus_price)
            .await
            .and_then(FieldValue::into_price);
        snapshot.subtitle = first_winning(page, &self.subtitle)
            .await
            .and_then(FieldValue::into_text);

        if let Some(coupons) = self.coupons(page).await {
            snapshot.has_coupon = true;
            snapshot.coupons = coupons;
        }

        info!(
            address = %page.address(),
            fields = snapshot.extracted_fields(),
            price = ?snapshot.price,
            coupons = snapshot.coupons.len(),
            "Extracted item page"
        );
        snapshot
    }

    async fn reveal_promotions(&self, page: &PageView<'_>) {
        let Some(script) = self.reveal_script else {
            return;
        };
        if let Err(e) = page.driver().run_script(script, &[]).await {
            debug!("Promotion panel not revealed: {}", e);
        }
    }

    /// `None` when the page has no visible coupon block at all.
    async fn coupons(&self, page: &PageView<'_>) -> Option<Vec<Coupon>> {
        for container in &self.coupon_containers {
            let found = match page.find_first(container).await {
                Ok(found) => found,
                Err(e) => {
                    debug!(selector = %container, "Coupon container lookup failed: {}", e);
                    continue;
                }
            };
            let Some(block) = found.filter(|block| block.is_visible()) else {
                continue;
            };
            if normalize_text(block.text()).is_none() {
                continue;
            }

            let mut coupons = Vec::new();
            for entry in &self.coupon_entries {
                let selector = format!("{} {}", container, entry);
                let entries = page.find_all(&selector).await.unwrap_or_default();
                coupons.extend(
                    entries
                        .iter()
                        .filter(|e| e.is_visible())
                        .filter_map(coupon::parse_coupon),
                );
                if !coupons.is_empty() {
                    break;
                }
            }
            return Some(coupons);
        }
        None
    }
}

/// Runs `strategies` in order and returns the first usable value.
pub async fn first_winning(page: &PageView<'_>, strategies: &[FieldStrategy]) -> Option<FieldValue> {
    for strategy in strategies {
        let Some(selector) = strategy.selector_for(page.item_id()) else {
            continue;
        };
        let elements = match strategy.pick {
            Pick::First => match page.find_first(&selector).await {
                Ok(found) => found.into_iter().collect::<Vec<_>>(),
                Err(e) => {
                    debug!(selector = %selector, "Lookup failed: {}", e);
                    continue;
                }
            },
            Pick::Max => match page.find_all(&selector).await {
                Ok(found) => found,
                Err(e) => {
                    debug!(selector = %selector, "Lookup failed: {}", e);
                    continue;
                }
            },
        };
        if let Some(value) = strategy.evaluate(&elements) {
            debug!(selector = %selector, "Strategy matched");
            return Some(value);
        }
    }
    None
}
