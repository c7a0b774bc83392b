use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserDriver, PageElement, WaitCondition};
use crate::config::NavigatorConfig;
use crate::retry::RetryPolicy;
use crate::site::SiteProfile;
use crate::utils::error::NavigationError;

const SCROLL_HALFWAY_SCRIPT: &str =
    "window.scrollTo(0, Math.floor(document.body.scrollHeight / 2)); return null;";

/// A loaded item page, valid until the next navigation on the same driver.
pub struct PageView<'a> {
    driver: &'a dyn BrowserDriver,
    address: Url,
    item_id: Option<String>,
}

impl<'a> PageView<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, address: Url, item_id: Option<String>) -> Self {
        Self {
            driver,
            address,
            item_id,
        }
    }

    pub fn driver(&self) -> &'a dyn BrowserDriver {
        self.driver
    }

    /// Where the browser actually ended up.
    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }

    pub async fn find_first(&self, selector: &str) -> anyhow::Result<Option<PageElement>> {
        self.driver.find_first(selector).await
    }

    pub async fn find_all(&self, selector: &str) -> anyhow::Result<Vec<PageElement>> {
        self.driver.find_all(selector).await
    }
}

/// Loads one page and decides whether what came back is the page we asked for.
pub struct Navigator {
    site: SiteProfile,
    policy: RetryPolicy,
    ready_selector: Option<String>,
    settle_timeout: Duration,
    settle_delay: Duration,
}

impl Navigator {
    pub fn new(site: SiteProfile, config: &NavigatorConfig) -> Self {
        Self {
            site,
            policy: RetryPolicy::from(config),
            ready_selector: config.ready_selector.clone(),
            settle_timeout: config.settle_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    pub fn site(&self) -> &SiteProfile {
        &self.site
    }

    /// Fetches `address`, retrying load failures with a growing delay.
    /// Sign-in gates and redirects away from the item are returned at once.
    pub async fn fetch<'a>(
        &self,
        driver: &'a dyn BrowserDriver,
        address: &Url,
    ) -> Result<PageView<'a>, NavigationError> {
        let mut tries = 0u32;
        let result = self
            .policy
            .run(
                || {
                    tries += 1;
                    debug!(address = %address, attempt = tries, "Loading page");
                    self.attempt(driver, address)
                },
                |error: &NavigationError| {
                    let retry = error.is_transient();
                    if retry {
                        warn!(address = %address, error = %error, "Page load failed, retrying");
                    }
                    retry
                },
            )
            .await;

        match result {
            Ok(resolved) => {
                metrics::counter!("sku_watcher_fetch_total", "outcome" => "ok").increment(1);
                let item_id = self.site.item_id_from_address(address);
                Ok(PageView::new(driver, resolved, item_id))
            }
            Err(error) => {
                metrics::counter!("sku_watcher_fetch_total", "outcome" => error.kind()).increment(1);
                info!(address = %address, kind = error.kind(), "Fetch gave up: {}", error);
                Err(error)
            }
        }
    }

    async fn attempt(&self, driver: &dyn BrowserDriver, address: &Url) -> Result<Url, NavigationError> {
        let browser_error = |e: anyhow::Error| NavigationError::Browser {
            address: address.to_string(),
            message: e.to_string(),
        };

        driver.navigate(address).await.map_err(browser_error)?;
        let resolved = driver.current_address().await.map_err(browser_error)?;
        self.classify_address(address, &resolved)?;

        let ready = match &self.ready_selector {
            Some(selector) => driver
                .wait_until(&WaitCondition::ElementPresent(selector.clone()), self.settle_timeout)
                .await
                .map_err(browser_error)?,
            None => true,
        };

        let markup = driver.page_text().await.map_err(browser_error)?;
        if self.site.has_logged_out_marker(&markup) {
            return Err(NavigationError::LoginRequired {
                address: resolved.to_string(),
            });
        }

        if !ready {
            return Err(NavigationError::Timeout {
                address: address.to_string(),
                waited_ms: self.settle_timeout.as_millis() as u64,
            });
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        // Lazy sections only render once scrolled into view.
        if let Err(e) = driver.run_script(SCROLL_HALFWAY_SCRIPT, &[]).await {
            debug!("Scroll rejected: {}", e);
        }

        Ok(resolved)
    }

    fn classify_address(&self, requested: &Url, resolved: &Url) -> Result<(), NavigationError> {
        if self.site.is_login_address(resolved) {
            return Err(NavigationError::LoginRequired {
                address: resolved.to_string(),
            });
        }

        if let Some(id) = self.site.item_id_from_address(requested) {
            let lost_item = self.site.is_landing_address(resolved) || !resolved.as_str().contains(&id);
            if lost_item {
                return Err(NavigationError::AntiBotRedirect {
                    requested: requested.to_string(),
                    resolved: resolved.to_string(),
                });
            }
        }

        Ok(())
    }
}
