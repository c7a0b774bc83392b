//! Fixed knowledge about the monitored shop: where its landing, login and
//! item pages live, and what a signed-out page looks like.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

static ITEM_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d+)\.html").expect("item id pattern is valid"));

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    /// Generic landing page; also the reference page for login checks.
    pub landing_url: String,
    pub login_url: String,
    /// Item page address with an `{id}` placeholder.
    pub item_url_template: String,
    /// Substrings of a resolved address that mean we were sent to sign in.
    pub login_address_markers: Vec<String>,
    /// Substrings of page markup only present while signed out.
    pub logged_out_markers: Vec<String>,
    /// Element that only renders for a signed-in visitor.
    pub logged_in_selector: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            landing_url: "https://www.jd.com".to_string(),
            login_url: "https://passport.jd.com/new/login.aspx".to_string(),
            item_url_template: "https://item.jd.com/{id}.html".to_string(),
            login_address_markers: vec![
                "passport.jd.com".to_string(),
                "/login".to_string(),
            ],
            logged_out_markers: vec![
                "请登录".to_string(),
                "登录注册".to_string(),
                "login-tab-r".to_string(),
                "登录京东".to_string(),
            ],
            logged_in_selector: ".nickname".to_string(),
        }
    }
}

impl SiteProfile {
    pub fn landing_address(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.landing_url)
    }

    pub fn login_address(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.login_url)
    }

    pub fn item_address(&self, id: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.item_url_template.replace("{id}", id))
    }

    /// Recovers the numeric item id from an item page address.
    pub fn item_id_from_address(&self, address: &Url) -> Option<String> {
        ITEM_ID_PATTERN
            .captures(address.path())
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn is_login_address(&self, address: &Url) -> bool {
        let address = address.as_str();
        self.login_address_markers
            .iter()
            .any(|marker| address.contains(marker.as_str()))
    }

    /// True when `address` is the bare landing page, ignoring query and fragment.
    pub fn is_landing_address(&self, address: &Url) -> bool {
        let Ok(landing) = self.landing_address() else {
            return false;
        };
        let same_host = address.host_str() == landing.host_str();
        let bare_path = matches!(address.path(), "" | "/");
        same_host && bare_path
    }

    pub fn has_logged_out_marker(&self, markup: &str) -> bool {
        self.logged_out_markers
            .iter()
            .any(|marker| markup.contains(marker.as_str()))
    }
}
