//! Login state for the single browsing session.
//!
//! Status starts `Unknown`, is settled by [`SessionGuard::load`] and may
//! later drop to `Expired` through [`SessionGuard::verify`]. Once expired it
//! only becomes `Valid` again through
//! [`SessionGuard::request_interactive_login`]; a probe that happens to look
//! signed in is not enough.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, WaitCondition};
use crate::config::SessionConfig;
use crate::models::Cookie;
use crate::site::SiteProfile;
use crate::utils::error::SessionError;

pub mod cookie_store;
pub mod login;

pub use cookie_store::CookieStore;
pub use login::{login_flow_for, LoginFlow, PollingLoginFlow, StdinLoginFlow};

const SIGNED_IN_HINT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Unknown,
    Valid,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub cookies: Vec<Cookie>,
    pub status: SessionStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            cookies: Vec::new(),
            status: SessionStatus::Unknown,
            verified_at: None,
        }
    }
}

pub struct SessionGuard {
    site: SiteProfile,
    profile: String,
    store: CookieStore,
    login: Box<dyn LoginFlow>,
    settle_delay: Duration,
    state: SessionState,
}

impl SessionGuard {
    pub fn new(site: SiteProfile, config: &SessionConfig, login: Box<dyn LoginFlow>) -> Self {
        Self {
            site,
            profile: config.profile.clone(),
            store: CookieStore::new(&config.cookie_dir),
            login,
            settle_delay: config.settle_delay(),
            state: SessionState::default(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Applies the stored cookies that have not expired and checks whether
    /// they still sign us in. Stored cookies that fail the check are deleted.
    pub async fn load(&mut self, driver: &dyn BrowserDriver) -> Result<SessionStatus, SessionError> {
        let stored = self.store.load(&self.profile).await?;
        let now = Utc::now();
        let (fresh, expired): (Vec<Cookie>, Vec<Cookie>) =
            stored.iter().cloned().partition(|cookie| !cookie.is_expired(now));
        if !expired.is_empty() {
            debug!(count = expired.len(), "Skipping expired cookies");
        }

        if !fresh.is_empty() {
            // Cookies only stick once the browser is on the cookie's site.
            self.open_landing(driver).await?;
            self.settle().await;
            for cookie in &fresh {
                if let Err(e) = driver.set_cookie(cookie).await {
                    warn!(cookie = %cookie.name, "Failed to apply cookie: {}", e);
                }
            }
            info!(count = fresh.len(), profile = %self.profile, "Applied stored cookies");
        }
        self.state.cookies = fresh;

        let signed_in = self.probe(driver).await?;
        if !signed_in && !stored.is_empty() {
            if let Err(e) = self.store.remove(&self.profile).await {
                warn!("Failed to discard stale cookies: {}", e);
            }
        }

        self.transition(signed_in, false);
        Ok(self.state.status)
    }

    /// Re-checks the sign-in state with whatever cookies the browser holds.
    pub async fn verify(&mut self, driver: &dyn BrowserDriver) -> Result<SessionStatus, SessionError> {
        let signed_in = self.probe(driver).await?;
        self.transition(signed_in, false);
        Ok(self.state.status)
    }

    /// Saves the browser's current cookies for the next run.
    pub async fn persist(&mut self, driver: &dyn BrowserDriver) -> Result<(), SessionError> {
        let cookies = driver
            .get_cookies()
            .await
            .map_err(|e| SessionError::PersistFailed(e.to_string()))?;
        if cookies.is_empty() {
            debug!("No cookies to persist");
            return Ok(());
        }
        self.store.save(&self.profile, &cookies).await?;
        self.state.cookies = cookies;
        Ok(())
    }

    /// Opens the login page, waits for the operator and re-checks. Anything
    /// other than a valid session afterwards is an error.
    pub async fn request_interactive_login(
        &mut self,
        driver: &dyn BrowserDriver,
    ) -> Result<SessionStatus, SessionError> {
        let login_address = self
            .site
            .login_address()
            .map_err(|e| SessionError::VerificationFailed(format!("invalid login address: {}", e)))?;
        driver
            .navigate(&login_address)
            .await
            .map_err(|e| SessionError::VerificationFailed(format!("could not open login page: {}", e)))?;

        info!(profile = %self.profile, "Waiting for interactive login");
        self.login
            .wait_for_operator(driver, &self.site)
            .await
            .map_err(|e| SessionError::VerificationFailed(e.to_string()))?;

        let signed_in = self.probe(driver).await?;
        self.transition(signed_in, true);
        if self.state.status != SessionStatus::Valid {
            return Err(SessionError::VerificationFailed(
                "still signed out after interactive login".to_string(),
            ));
        }
        info!(profile = %self.profile, "Interactive login succeeded");
        Ok(self.state.status)
    }

    fn transition(&mut self, signed_in: bool, reauthenticated: bool) {
        let next = if signed_in {
            SessionStatus::Valid
        } else {
            SessionStatus::Expired
        };
        if self.state.status == SessionStatus::Expired && next == SessionStatus::Valid && !reauthenticated {
            debug!("Session looks signed in again but stays expired until re-authentication");
            return;
        }
        if next != self.state.status {
            info!(from = ?self.state.status, to = ?next, "Session status changed");
        }
        self.state.status = next;
        self.state.verified_at = Some(Utc::now());
    }

    async fn open_landing(&self, driver: &dyn BrowserDriver) -> Result<(), SessionError> {
        let landing = self
            .site
            .landing_address()
            .map_err(|e| SessionError::VerificationFailed(format!("invalid landing address: {}", e)))?;
        driver
            .navigate(&landing)
            .await
            .map_err(|e| SessionError::VerificationFailed(format!("could not open {}: {}", landing, e)))
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }

    /// Loads the landing page and looks for signs of being signed out.
    async fn probe(&self, driver: &dyn BrowserDriver) -> Result<bool, SessionError> {
        self.open_landing(driver).await?;
        self.settle().await;

        let failed = |e: anyhow::Error| SessionError::VerificationFailed(e.to_string());
        let address = driver.current_address().await.map_err(failed)?;
        if self.site.is_login_address(&address) {
            debug!(address = %address, "Landing page redirected to login");
            return Ok(false);
        }
        let markup = driver.page_text().await.map_err(failed)?;
        if self.site.has_logged_out_marker(&markup) {
            return Ok(false);
        }

        let hint = WaitCondition::ElementPresent(self.site.logged_in_selector.clone());
        if !driver.wait_until(&hint, SIGNED_IN_HINT_TIMEOUT).await.unwrap_or(false) {
            debug!("No signed-in marker on the landing page; assuming signed in");
        }
        Ok(true)
    }
}
