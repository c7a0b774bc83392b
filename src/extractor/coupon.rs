use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::browser::PageElement;
use crate::models::Coupon;

static THRESHOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"满\s*(\d+(?:\.\d+)?)\s*(?:元)?\s*减\s*(\d+(?:\.\d+)?)").expect("threshold pattern is valid")
});

static FACE_VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:立减|减|[¥￥])\s*(\d+(?:\.\d+)?)|(\d+(?:\.\d+)?)\s*元").expect("face value pattern is valid")
});

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[.\-/年](\d{1,2})[.\-/月](\d{1,2})").expect("date pattern is valid")
});

/// Reads one coupon entry such as `满199减20` with an optional validity
/// window in its text or `title` attribute.
pub fn parse_coupon(entry: &PageElement) -> Option<Coupon> {
    let text = entry.text();
    let title = entry.attribute("title").unwrap_or_default();

    let (threshold, face_value) = match THRESHOLD_PATTERN.captures(text) {
        Some(captures) => {
            let threshold = Decimal::from_str(captures.get(1)?.as_str()).ok()?;
            let face_value = Decimal::from_str(captures.get(2)?.as_str()).ok()?;
            (Some(threshold), face_value)
        }
        None => {
            let captures = FACE_VALUE_PATTERN.captures(text)?;
            let token = captures.get(1).or_else(|| captures.get(2))?;
            (None, Decimal::from_str(token.as_str()).ok()?)
        }
    };

    let expiry = parse_expiry(title).or_else(|| parse_expiry(text));

    Some(Coupon {
        face_value,
        threshold,
        expiry,
    })
}

/// The last date mentioned, which for a `start-end` window is the end.
pub fn parse_expiry(text: &str) -> Option<NaiveDate> {
    DATE_PATTERN
        .captures_iter(text)
        .filter_map(|captures| {
            let year = captures.get(1)?.as_str().parse().ok()?;
            let month = captures.get(2)?.as_str().parse().ok()?;
            let day = captures.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .last()
}
