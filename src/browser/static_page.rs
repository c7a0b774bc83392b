//! A driver over saved HTML documents.
//!
//! Serves pages from memory keyed by address, follows configured redirects
//! and answers selector queries with `scraper`. No script runs, so anything
//! the live site renders client-side has to be present in the saved markup.
//! Used for offline re-parsing of captured pages and throughout the tests.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

use super::{BrowserDriver, PageElement, WaitCondition};
use crate::models::Cookie;

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Default)]
struct StaticState {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    current: Option<Url>,
    cookies: Vec<Cookie>,
    navigations: Vec<String>,
    scripts: Vec<String>,
    closed: bool,
}

/// Cheap to clone; clones share the same pages and browsing state.
#[derive(Debug, Clone, Default)]
pub struct StaticPage {
    state: Arc<Mutex<StaticState>>,
}

fn key(address: &str) -> String {
    Url::parse(address)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| address.to_string())
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn hides(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    value
        .attr("style")
        .map(|style| style.replace(' ', "").contains("display:none"))
        .unwrap_or(false)
}

fn is_visible(element: &ElementRef<'_>) -> bool {
    if hides(element) {
        return false;
    }
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| hides(&ancestor))
}

fn to_page_element(element: ElementRef<'_>) -> PageElement {
    PageElement {
        text: element_text(&element),
        visible: is_visible(&element),
        attributes: element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    }
}

impl StaticPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, address: &str, html: impl Into<String>) -> Self {
        self.set_page(address, html);
        self
    }

    pub fn with_redirect(self, from: &str, to: &str) -> Self {
        self.set_redirect(from, to);
        self
    }

    /// Loads a saved page from disk and serves it at `address`.
    pub fn from_file(address: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read saved page {}", path.display()))?;
        Ok(Self::new().with_page(address, html))
    }

    pub fn set_page(&self, address: &str, html: impl Into<String>) {
        self.lock().pages.insert(key(address), html.into());
    }

    pub fn set_redirect(&self, from: &str, to: &str) {
        self.lock().redirects.insert(key(from), key(to));
    }

    pub fn clear_redirect(&self, from: &str) {
        self.lock().redirects.remove(&key(from));
    }

    /// Every address requested through `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.lock().cookies.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, StaticState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_html(&self) -> String {
        let state = self.lock();
        state
            .current
            .as_ref()
            .and_then(|url| state.pages.get(url.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    fn select(&self, selector: &str, limit: usize) -> Result<Vec<PageElement>> {
        let parsed =
            Selector::parse(selector).map_err(|e| anyhow!("Invalid CSS selector '{}': {:?}", selector, e))?;
        let document = Html::parse_document(&self.current_html());
        Ok(document
            .select(&parsed)
            .take(limit)
            .map(to_page_element)
            .collect())
    }
}

#[async_trait]
impl BrowserDriver for StaticPage {
    async fn navigate(&self, address: &Url) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(anyhow!("Session already closed"));
        }
        state.navigations.push(address.to_string());

        let mut resolved = address.to_string();
        for _ in 0..MAX_REDIRECTS {
            match state.redirects.get(&resolved) {
                Some(target) => resolved = target.clone(),
                None => break,
            }
        }
        state.current = Some(Url::parse(&resolved)?);
        Ok(())
    }

    async fn current_address(&self) -> Result<Url> {
        self.lock()
            .current
            .clone()
            .ok_or_else(|| anyhow!("No page loaded"))
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.current_html())
    }

    async fn find_first(&self, selector: &str) -> Result<Option<PageElement>> {
        Ok(self.select(selector, 1)?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<PageElement>> {
        self.select(selector, usize::MAX)
    }

    async fn run_script(&self, code: &str, _args: &[serde_json::Value]) -> Result<serde_json::Value> {
        self.lock().scripts.push(code.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        let mut state = self.lock();
        state.cookies.retain(|existing| existing.name != cookie.name);
        state.cookies.push(cookie.clone());
        Ok(())
    }

    async fn get_cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.cookies())
    }

    async fn wait_until(&self, condition: &WaitCondition, _timeout: Duration) -> Result<bool> {
        match condition {
            WaitCondition::ElementPresent(selector) => Ok(!self.select(selector, 1)?.is_empty()),
            other => {
                let current = self
                    .lock()
                    .current
                    .as_ref()
                    .map(|url| url.to_string())
                    .unwrap_or_default();
                Ok(other.address_matches(&current).unwrap_or(false))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
