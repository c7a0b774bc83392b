use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::site::SiteProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    pub site: SiteProfile,
    pub navigator: NavigatorConfig,
    pub session: SessionConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub page_load_timeout_secs: u64,
    /// How long the browser may sit idle between cycles before it is torn down.
    pub idle_timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/135.0.7049.95 Safari/537.36"
                .to_string(),
            window_width: 1366,
            window_height: 768,
            page_load_timeout_secs: 20,
            idle_timeout_secs: 3600,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub settle_timeout_secs: u64,
    pub settle_delay_ms: u64,
    /// Element whose presence means the page finished rendering.
    pub ready_selector: Option<String>,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 2000,
            settle_timeout_secs: 10,
            settle_delay_ms: 2000,
            ready_selector: Some(".sku-name".to_string()),
        }
    }
}

impl NavigatorConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoginMode {
    /// Operator confirms on the terminal.
    Stdin,
    /// Wait for the browser to leave the login page on its own.
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub profile: String,
    pub cookie_dir: String,
    pub settle_delay_ms: u64,
    pub login_mode: LoginMode,
    pub login_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            cookie_dir: "data/cookies".to_string(),
            settle_delay_ms: 1000,
            login_mode: LoginMode::Stdin,
            login_timeout_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cookie_path(&self) -> PathBuf {
        PathBuf::from(&self.cookie_dir).join(format!("{}.cookies.json", self.profile))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Item ids or item page addresses, processed in this order.
    pub items: Vec<String>,
    pub interval_secs: u64,
    pub item_delay_secs: u64,
    pub max_runtime_secs: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            interval_secs: 60,
            item_delay_secs: 3,
            max_runtime_secs: None,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }

    pub fn max_runtime(&self) -> Option<Duration> {
        self.max_runtime_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub history_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: "data/history.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub webhook: Option<WebhookConfig>,
    pub discord: Option<DiscordConfig>,
    /// Also write every outbound message to the log.
    pub log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub bearer_token: Option<String>,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub webhook_url: String,
    #[serde(default = "default_discord_username")]
    pub username: String,
    pub avatar_url: Option<String>,
}

fn default_discord_username() -> String {
    "SKU Watcher".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// Directory for a daily rolling log file; stdout only when unset.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "sku_watcher=info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "SKU_WATCHER_"
            .add_source(
                Environment::with_prefix("SKU_WATCHER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("monitor.items")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Message("Monitor interval_secs must be greater than 0".into()));
        }

        if self.navigator.retry_attempts == 0 {
            return Err(ConfigError::Message("Navigator retry_attempts must be greater than 0".into()));
        }

        if self.navigator.settle_timeout_secs == 0 {
            return Err(ConfigError::Message("Navigator settle_timeout_secs must be greater than 0".into()));
        }

        for (name, address) in [
            ("landing_url", &self.site.landing_url),
            ("login_url", &self.site.login_url),
        ] {
            if Url::parse(address).is_err() {
                return Err(ConfigError::Message(format!("Invalid site {} format", name)));
            }
        }

        if !self.site.item_url_template.contains("{id}") {
            return Err(ConfigError::Message("Site item_url_template must contain {id}".into()));
        }

        if self.session.profile.trim().is_empty() {
            return Err(ConfigError::Message("Session profile must not be empty".into()));
        }

        if let Some(webhook) = &self.notifications.webhook {
            if Url::parse(&webhook.url).is_err() {
                return Err(ConfigError::Message("Invalid webhook url format".into()));
            }
        }

        if let Some(discord) = &self.notifications.discord {
            if !discord.webhook_url.starts_with("https://discord.com/api/webhooks/") {
                return Err(ConfigError::Message("Invalid Discord webhook URL format".into()));
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.monitor.items = vec!["100038005189".to_string()];
        config
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_interval() {
        let mut config = valid_config();
        config.monitor.interval_secs = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("interval_secs must be greater than 0"));
    }

    #[test]
    fn test_config_validation_zero_retries() {
        let mut config = valid_config();
        config.navigator.retry_attempts = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("retry_attempts"));
    }

    #[test]
    fn test_config_validation_invalid_landing_url() {
        let mut config = valid_config();
        config.site.landing_url = "not-a-valid-url".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid site landing_url"));
    }

    #[test]
    fn test_config_validation_item_template_placeholder() {
        let mut config = valid_config();
        config.site.item_url_template = "https://item.jd.com/".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("{id}"));
    }

    #[test]
    fn test_config_validation_invalid_discord_webhook() {
        let mut config = valid_config();
        config.notifications.discord = Some(DiscordConfig {
            webhook_url: "https://invalid-webhook-url.com".to_string(),
            username: default_discord_username(),
            avatar_url: None,
        });

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid Discord webhook URL"));
    }

    #[test]
    fn test_cookie_path_uses_profile() {
        let mut config = valid_config();
        config.session.cookie_dir = "/tmp/cookies".to_string();
        config.session.profile = "buyer".to_string();

        assert_eq!(
            config.session.cookie_path(),
            PathBuf::from("/tmp/cookies/buyer.cookies.json")
        );
    }

    #[test]
    fn test_from_file_with_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[monitor]
items = ["5544068", "https://item.jd.com/100038005189.html"]
interval_secs = 120

[session]
profile = "buyer"
login_mode = "poll"

[notifications.webhook]
url = "https://push.example.com/hook"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::from_file(&path).unwrap();

        assert_eq!(config.monitor.items.len(), 2);
        assert_eq!(config.monitor.interval_secs, 120);
        assert_eq!(config.monitor.item_delay_secs, 3);
        assert_eq!(config.session.login_mode, LoginMode::Poll);
        assert_eq!(config.navigator.retry_attempts, 3);
        assert_eq!(config.site, SiteProfile::default());
        assert_eq!(config.notifications.webhook.unwrap().timeout_secs, 10);
    }
}
