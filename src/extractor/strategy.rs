use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::browser::PageElement;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

const CURRENCY_GLYPHS: &[char] = &['¥', '￥', '$', '元'];
const ITEM_ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Trimmed, whitespace-collapsed, non-empty text.
    Text,
    /// A non-negative decimal after removing currency glyphs and separators.
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    /// Only the first matching element is considered.
    First,
    /// Every visible match is normalised and the largest value kept.
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Price(Decimal),
}

impl FieldValue {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Price(_) => None,
        }
    }

    pub fn into_price(self) -> Option<Decimal> {
        match self {
            Self::Price(price) => Some(price),
            Self::Text(_) => None,
        }
    }
}

/// One way of reading one field: where to look and how to clean what is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldStrategy {
    /// CSS selector; `{id}` is replaced with the item id.
    pub selector: &'static str,
    pub rule: Rule,
    pub pick: Pick,
}

impl FieldStrategy {
    pub const fn text(selector: &'static str) -> Self {
        Self {
            selector,
            rule: Rule::Text,
            pick: Pick::First,
        }
    }

    pub const fn price(selector: &'static str) -> Self {
        Self {
            selector,
            rule: Rule::Price,
            pick: Pick::First,
        }
    }

    /// Broad selector that may hit several numbers; the largest wins.
    pub const fn max_price(selector: &'static str) -> Self {
        Self {
            selector,
            rule: Rule::Price,
            pick: Pick::Max,
        }
    }

    /// The concrete selector for an item, or `None` when the selector needs an
    /// item id and there is none.
    pub fn selector_for(&self, item_id: Option<&str>) -> Option<String> {
        if !self.selector.contains(ITEM_ID_PLACEHOLDER) {
            return Some(self.selector.to_string());
        }
        item_id.map(|id| self.selector.replace(ITEM_ID_PLACEHOLDER, id))
    }

    /// Applies the rule to the elements the selector matched.
    pub fn evaluate(&self, elements: &[PageElement]) -> Option<FieldValue> {
        match self.pick {
            Pick::First => {
                let element = elements.first().filter(|e| e.is_visible())?;
                self.normalize(element.text())
            }
            Pick::Max => match self.rule {
                Rule::Price => elements
                    .iter()
                    .filter(|e| e.is_visible())
                    .filter_map(|e| normalize_price(e.text()))
                    .max()
                    .map(FieldValue::Price),
                Rule::Text => elements
                    .iter()
                    .filter(|e| e.is_visible())
                    .find_map(|e| self.normalize(e.text())),
            },
        }
    }

    fn normalize(&self, raw: &str) -> Option<FieldValue> {
        match self.rule {
            Rule::Text => normalize_text(raw).map(FieldValue::Text),
            Rule::Price => normalize_price(raw).map(FieldValue::Price),
        }
    }
}

pub fn normalize_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Reads the first number out of a price label such as `¥1,234.50`.
/// Negative numbers and text without digits give `None`.
pub fn normalize_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '，' && !CURRENCY_GLYPHS.contains(c))
        .collect();
    let token = NUMBER_PATTERN.find(&cleaned)?.as_str();
    let price = Decimal::from_str(token).ok()?;
    (!price.is_sign_negative()).then_some(price)
}
