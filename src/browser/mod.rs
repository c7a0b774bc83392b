//! The capability surface the monitor needs from a browsing session.
//!
//! Navigator, field extractor and session guard all talk to the page through
//! [`BrowserDriver`]; the monitor loop owns the single driver instance and
//! lends it out by reference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::models::Cookie;

pub mod chrome;
pub mod static_page;

pub use chrome::ChromeDriver;
pub use static_page::StaticPage;

/// A detached view of one DOM element.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageElement {
    pub text: String,
    pub visible: bool,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl PageElement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// A CSS selector matches at least one element.
    ElementPresent(String),
    AddressStartsWith(String),
}

impl WaitCondition {
    pub fn address_matches(&self, address: &str) -> Option<bool> {
        match self {
            Self::AddressStartsWith(prefix) => Some(address.starts_with(prefix.as_str())),
            Self::ElementPresent(_) => None,
        }
    }
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, address: &Url) -> anyhow::Result<()>;
    async fn current_address(&self) -> anyhow::Result<Url>;
    /// Rendered markup of the current document.
    async fn page_text(&self) -> anyhow::Result<String>;
    async fn find_first(&self, selector: &str) -> anyhow::Result<Option<PageElement>>;
    async fn find_all(&self, selector: &str) -> anyhow::Result<Vec<PageElement>>;
    /// Runs `code` as a function body with `args` bound to `arguments`.
    async fn run_script(
        &self,
        code: &str,
        args: &[serde_json::Value],
    ) -> anyhow::Result<serde_json::Value>;
    async fn set_cookie(&self, cookie: &Cookie) -> anyhow::Result<()>;
    async fn get_cookies(&self) -> anyhow::Result<Vec<Cookie>>;
    async fn wait_until(&self, condition: &WaitCondition, timeout: Duration) -> anyhow::Result<bool>;

    /// Releases the underlying session. Further calls may fail.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
