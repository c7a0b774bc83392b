//! The human half of signing in.
//!
//! The session guard opens the login page and then hands over to a
//! [`LoginFlow`], which returns once the operator is done (or gives up).
//! Whether the login actually worked is checked by the guard afterwards.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::browser::{BrowserDriver, WaitCondition};
use crate::config::{LoginMode, SessionConfig};
use crate::site::SiteProfile;

#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// Called with the login page already open in `driver`.
    async fn wait_for_operator(&self, driver: &dyn BrowserDriver, site: &SiteProfile) -> anyhow::Result<()>;
}

/// Operator signs in through the browser window and presses Enter.
#[derive(Debug, Default, Clone)]
pub struct StdinLoginFlow;

#[async_trait]
impl LoginFlow for StdinLoginFlow {
    async fn wait_for_operator(&self, _driver: &dyn BrowserDriver, site: &SiteProfile) -> anyhow::Result<()> {
        println!("Sign in at {} in the browser window, then press Enter to continue...", site.login_url);

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            anyhow::bail!("stdin closed before login was confirmed");
        }
        Ok(())
    }
}

/// Waits for the browser to land back on the site after a successful login.
#[derive(Debug, Clone)]
pub struct PollingLoginFlow {
    timeout: Duration,
}

impl PollingLoginFlow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LoginFlow for PollingLoginFlow {
    async fn wait_for_operator(&self, driver: &dyn BrowserDriver, site: &SiteProfile) -> anyhow::Result<()> {
        info!(
            timeout_secs = self.timeout.as_secs(),
            "Waiting for login to complete at {}", site.login_url
        );
        let returned = WaitCondition::AddressStartsWith(site.landing_url.clone());
        if driver.wait_until(&returned, self.timeout).await? {
            Ok(())
        } else {
            anyhow::bail!("login not completed within {}s", self.timeout.as_secs())
        }
    }
}

pub fn login_flow_for(config: &SessionConfig) -> Box<dyn LoginFlow> {
    match config.login_mode {
        LoginMode::Stdin => Box::new(StdinLoginFlow),
        LoginMode::Poll => Box::new(PollingLoginFlow::new(Duration::from_secs(config.login_timeout_secs))),
    }
}
