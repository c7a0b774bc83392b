//! Field strategies for item pages.
//!
//! Each list is tried top to bottom and the first usable value wins, so the
//! most specific selectors come first and broad fallbacks last.
//!
//! When a field starts coming back empty, save the page (`sku-watcher check`
//! prints what was found), adjust the list here and add the page to the tests.

use super::strategy::FieldStrategy;

pub static NAME: &[FieldStrategy] = &[
    FieldStrategy::text("div.sku-name"),
    FieldStrategy::text("div[class*='item-name']"),
    FieldStrategy::text(".product-intro div.name"),
];

pub static PRICE: &[FieldStrategy] = &[
    FieldStrategy::price("span.price.J-p-{id}"),
    FieldStrategy::price("span[class='price']"),
    FieldStrategy::price("div.p-price > span:nth-child(2)"),
    FieldStrategy::price("div[class*='price-box'] span[class='price']"),
    FieldStrategy::price("strong.J-p-{id}"),
    FieldStrategy::max_price("span.p-price span"),
    FieldStrategy::price("strong#J_p-{id}"),
    FieldStrategy::max_price(".p-price span"),
];

pub static PLUS_PRICE: &[FieldStrategy] = &[
    FieldStrategy::price("div.p-price-plus span[class='price']"),
    FieldStrategy::price("span[class*='plus-price']"),
];

pub static SUBTITLE: &[FieldStrategy] = &[
    FieldStrategy::text("div#p-ad"),
    FieldStrategy::text("div.sku-desc"),
    FieldStrategy::text("div[class*='sku-subtitle']"),
];

/// Blocks that hold the coupon list, most specific first.
pub static COUPON_CONTAINERS: &[&str] = &["#summary-quan", ".summary-quan", "[class*='coupon-list']"];

/// Single coupon entries, relative to a container.
pub static COUPON_ENTRIES: &[&str] = &[".quan-item", "[class*='coupon-item']"];

/// Expands the collapsed promotion panel next to the price, if there is one.
pub const PROMO_REVEAL_SCRIPT: &str = r#"
const toggle = document.querySelector('#J-summary-top .J-prom-more, .summary-promotion .prom-more, .J-prom-more');
if (toggle) { toggle.click(); return true; }
return false;
"#;
