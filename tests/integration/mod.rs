// Integration tests for SKU Watcher
// These tests drive the whole monitor loop against saved pages

pub mod extraction_tests;
pub mod monitor_tests;
pub mod session_tests;

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use sku_watcher::browser::{BrowserDriver, StaticPage};
use sku_watcher::config::{MonitorConfig, NavigatorConfig, SessionConfig};
use sku_watcher::detector::{ChangeDetector, HistoryStore};
use sku_watcher::extractor::FieldExtractor;
use sku_watcher::models::{ChangeEvent, Cookie, ItemTarget};
use sku_watcher::navigator::Navigator;
use sku_watcher::notifier::Notifier;
use sku_watcher::plugins::{NotificationPayload, NotificationTransport};
use sku_watcher::session::{LoginFlow, SessionGuard};
use sku_watcher::site::SiteProfile;
use sku_watcher::utils::NotificationError;
use sku_watcher::MonitorLoop;

pub const LANDING: &str = "https://www.jd.com";
pub const LOGIN: &str = "https://passport.jd.com/new/login.aspx";

pub const SIGNED_IN: &str = r#"<html><body>
    <div class="user"><span class="nickname">jd_buyer</span></div>
</body></html>"#;

pub const SIGNED_OUT: &str = r#"<html><body>
    <div class="user"><a class="link-login">你好，请登录</a></div>
</body></html>"#;

pub fn item_address(id: &str) -> String {
    format!("https://item.jd.com/{}.html", id)
}

/// A product page in the shape the live site serves.
pub fn item_page(id: &str, name: &str, price: &str, coupons: &[&str]) -> String {
    let coupon_block = if coupons.is_empty() {
        String::new()
    } else {
        let entries: String = coupons
            .iter()
            .map(|c| format!(r#"<span class="quan-item">{}</span>"#, c))
            .collect();
        format!(r#"<div id="summary-quan"><span class="label">领券</span>{}</div>"#, entries)
    };
    format!(
        r#"<html><body>
            <div class="product-intro">
                <div class="sku-name">{name}</div>
                <div class="news"><div id="p-ad">限时特惠</div></div>
                <div class="summary-price">
                    <span class="p-price"><span>￥</span><span class="price J-p-{id}">{price}</span></span>
                </div>
                {coupon_block}
            </div>
        </body></html>"#
    )
}

/// Every message handed to the transport, in order.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<(ChangeEvent, NotificationPayload)>>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| serde_json::to_value(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, event: &ChangeEvent, payload: &NotificationPayload) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push((event.clone(), payload.clone()));
        if self.fail {
            return Err(NotificationError::Rejected {
                transport: "recording".to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

/// Stands in for the operator: "logging in" makes the landing page signed in,
/// hands out a session cookie and lifts the login gate from every address in
/// `gated`.
#[derive(Clone)]
pub struct ScriptedLogin {
    pub driver: StaticPage,
    pub calls: Arc<AtomicU32>,
    pub gated: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLogin {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sends `address` to the login page until the next login.
    pub fn gate(&self, address: &str) {
        self.driver.set_redirect(address, LOGIN);
        self.gated.lock().unwrap().push(address.to_string());
    }
}

#[async_trait]
impl LoginFlow for ScriptedLogin {
    async fn wait_for_operator(&self, _driver: &dyn BrowserDriver, _site: &SiteProfile) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.driver.set_page(LANDING, SIGNED_IN);
        self.driver.clear_redirect(LANDING);
        self.driver.set_cookie(&Cookie::new("thor", "token").with_domain(".jd.com")).await?;
        for address in self.gated.lock().unwrap().drain(..) {
            self.driver.clear_redirect(&address);
        }
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub driver: StaticPage,
    pub transport: RecordingTransport,
    pub login: ScriptedLogin,
}

impl Harness {
    pub fn new() -> Self {
        let driver = StaticPage::new().with_page(LANDING, SIGNED_IN);
        Self::with_driver(driver)
    }

    pub fn with_driver(driver: StaticPage) -> Self {
        let login = ScriptedLogin {
            driver: driver.clone(),
            calls: Arc::new(AtomicU32::new(0)),
            gated: Arc::new(Mutex::new(Vec::new())),
        };
        Self {
            dir: tempfile::tempdir().unwrap(),
            driver,
            transport: RecordingTransport::default(),
            login,
        }
    }

    pub fn state_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            profile: "buyer".to_string(),
            cookie_dir: self.dir.path().join("cookies").display().to_string(),
            settle_delay_ms: 0,
            ..SessionConfig::default()
        }
    }

    pub fn history_path(&self) -> std::path::PathBuf {
        self.dir.path().join("history.json")
    }

    /// A loop over `items` that stops after one completed cycle.
    pub async fn monitor(&self, items: &[&str]) -> MonitorLoop {
        let site = SiteProfile::default();
        let navigator_config = NavigatorConfig {
            retry_attempts: 2,
            retry_delay_ms: 0,
            settle_delay_ms: 0,
            ..NavigatorConfig::default()
        };
        let monitor_config = MonitorConfig {
            interval_secs: 1,
            item_delay_secs: 0,
            max_runtime_secs: Some(0),
            ..MonitorConfig::default()
        };
        let locators: Vec<String> = items.iter().map(|s| s.to_string()).collect();

        MonitorLoop::new(
            Box::new(self.driver.clone()),
            Navigator::new(site.clone(), &navigator_config),
            FieldExtractor::new(),
            SessionGuard::new(site.clone(), &self.session_config(), Box::new(self.login.clone())),
            ChangeDetector::open(HistoryStore::new(self.history_path()))
                .await
                .unwrap(),
            Notifier::new(vec![Box::new(self.transport.clone())]),
            ItemTarget::resolve_all(&locators, &site).unwrap(),
            &monitor_config,
        )
    }

    pub async fn history(&self) -> serde_json::Value {
        let raw = tokio::fs::read_to_string(self.history_path()).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}
