use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::json;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{BrowserDriver, PageElement, WaitCondition};
use crate::config::BrowserConfig;
use crate::models::Cookie;

/// Hides the most obvious automation fingerprints from page scripts. Runs in
/// every new document before the page's own scripts.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.navigator.chrome = { runtime: {} };
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;
delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;
"#;

/// Default Chrome switch that announces automation to the page.
const AUTOMATION_SWITCH: &str = "--enable-automation";

/// Serialises matching elements to JSON so the result survives `evaluate` by value.
const COLLECT_ELEMENTS_SCRIPT: &str = r#"
(function(selector, limit) {
    const nodes = Array.from(document.querySelectorAll(selector)).slice(0, limit);
    return JSON.stringify(nodes.map(function(node) {
        const attributes = {};
        for (const attr of node.attributes) {
            attributes[attr.name] = attr.value;
        }
        const style = window.getComputedStyle(node);
        const boxed = !!(node.offsetWidth || node.offsetHeight || node.getClientRects().length);
        return {
            text: (node.innerText || node.textContent || '').trim(),
            visible: boxed && style.visibility !== 'hidden',
            attributes: attributes
        };
    }));
})"#;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Single-tab Chrome session. One instance per process; it is shared by
/// reference with every component that needs the page.
pub struct ChromeDriver {
    // Keeps the browser process alive for as long as the tab is used.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let proxy_arg = config
            .proxy
            .as_ref()
            .map(|proxy| format!("--proxy-server={}", proxy));

        let mut args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--disable-notifications"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-default-apps"),
            OsStr::new("--disable-background-timer-throttling"),
            OsStr::new("--disable-backgrounding-occluded-windows"),
            OsStr::new("--disable-renderer-backgrounding"),
            OsStr::new("--ignore-certificate-errors"),
        ];
        if let Some(proxy_arg) = &proxy_arg {
            tracing::info!(proxy = ?config.proxy, "Chrome using proxy");
            args.push(OsStr::new(proxy_arg.as_str()));
        }

        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.idle_timeout_secs))
            .args(args)
            .ignore_default_args(vec![OsStr::new(AUTOMATION_SWITCH)])
            .build()
            .map_err(|e| anyhow!("Failed to create launch options: {}", e))?;

        // Set Chrome path if provided
        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }

        let browser =
            Browser::new(launch_options).map_err(|e| anyhow!("Failed to launch browser: {}", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| anyhow!("Failed to create tab: {}", e))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| anyhow!("Failed to set user agent: {}", e))?;
        tab.set_default_timeout(Duration::from_secs(config.page_load_timeout_secs));
        tab.call_method(stealth_registration()?)
            .map_err(|e| anyhow!("Failed to register stealth script: {}", e))?;

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn evaluate_json(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| anyhow!("Script evaluation failed: {}", e))?;

        match result.value {
            Some(serde_json::Value::String(encoded)) => serde_json::from_str(&encoded)
                .context("Failed to decode script result"),
            Some(other) => Ok(other),
            None => Ok(serde_json::Value::Null),
        }
    }

    fn collect(&self, selector: &str, limit: usize) -> Result<Vec<PageElement>> {
        let expression = format!(
            "{}({}, {})",
            COLLECT_ELEMENTS_SCRIPT,
            serde_json::to_string(selector)?,
            limit
        );
        let value = self.evaluate_json(&expression)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).context("Unexpected element payload")
    }
}

fn stealth_registration() -> Result<AddScriptToEvaluateOnNewDocument> {
    serde_json::from_value(json!({ "source": STEALTH_SCRIPT }))
        .context("Failed to build stealth script registration")
}

fn cookie_param(cookie: &Cookie, fallback_url: &str) -> Result<CookieParam> {
    let mut param = json!({
        "name": cookie.name,
        "value": cookie.value,
        "secure": cookie.secure,
        "httpOnly": cookie.http_only,
    });
    match &cookie.domain {
        Some(domain) => param["domain"] = json!(domain),
        None => param["url"] = json!(fallback_url),
    }
    if let Some(path) = &cookie.path {
        param["path"] = json!(path);
    }
    if let Some(expiry) = cookie.expiry {
        param["expires"] = json!(expiry as f64);
    }
    serde_json::from_value(param).context("Failed to build cookie parameter")
}

fn cookie_from_protocol(raw: serde_json::Value) -> Option<Cookie> {
    let name = raw.get("name")?.as_str()?.to_string();
    let value = raw.get("value")?.as_str()?.to_string();
    // The protocol reports -1 for session cookies.
    let expiry = raw
        .get("expires")
        .and_then(|v| v.as_f64())
        .filter(|expires| *expires > 0.0)
        .map(|expires| expires as i64);

    Some(Cookie {
        name,
        value,
        domain: raw.get("domain").and_then(|v| v.as_str()).map(str::to_string),
        path: raw.get("path").and_then(|v| v.as_str()).map(str::to_string),
        expiry,
        secure: raw.get("secure").and_then(|v| v.as_bool()).unwrap_or(false),
        http_only: raw.get("httpOnly").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, address: &Url) -> Result<()> {
        self.tab
            .navigate_to(address.as_str())
            .map_err(|e| anyhow!("Navigation failed: {}", e))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| anyhow!("Page load failed: {}", e))?;
        Ok(())
    }

    async fn current_address(&self) -> Result<Url> {
        let url = self.tab.get_url();
        Url::parse(&url).with_context(|| format!("Browser reported unparsable address '{}'", url))
    }

    async fn page_text(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| anyhow!("Failed to get page content: {}", e))
    }

    async fn find_first(&self, selector: &str) -> Result<Option<PageElement>> {
        Ok(self.collect(selector, 1)?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<PageElement>> {
        self.collect(selector, usize::from(u16::MAX))
    }

    async fn run_script(&self, code: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let expression = format!(
            "(function() {{ const result = (function() {{ {} }}).apply(null, {}); \
             return result === undefined ? null : JSON.stringify(result); }})()",
            code,
            serde_json::to_string(args)?
        );
        self.evaluate_json(&expression)
    }

    async fn set_cookie(&self, cookie: &Cookie) -> Result<()> {
        let param = cookie_param(cookie, &self.tab.get_url())?;
        self.tab
            .set_cookies(vec![param])
            .map_err(|e| anyhow!("Failed to set cookie '{}': {}", cookie.name, e))
    }

    async fn get_cookies(&self) -> Result<Vec<Cookie>> {
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| anyhow!("Failed to read cookies: {}", e))?;

        let mut converted = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            if let Some(cookie) = cookie_from_protocol(serde_json::to_value(&cookie)?) {
                converted.push(cookie);
            }
        }
        Ok(converted)
    }

    async fn wait_until(&self, condition: &WaitCondition, timeout: Duration) -> Result<bool> {
        if let WaitCondition::ElementPresent(selector) = condition {
            return Ok(self
                .tab
                .wait_for_element_with_custom_timeout(selector, timeout)
                .is_ok());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition.address_matches(&self.tab.get_url()) == Some(true) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&self) -> Result<()> {
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| anyhow!("Failed to close tab: {}", e))
    }
}
