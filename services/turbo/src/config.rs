//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Notification credentials may come from DISCORD_WEBHOOK_URL,
//! TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID so they can stay out of the TOML.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration. Every section has defaults except `[monitor]`, which
/// only the monitor role requires.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Availability registry service
#[derive(Debug, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_registry_file")]
    pub data_file: PathBuf,
}

/// Claim broker service
#[derive(Debug, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_pool_file")]
    pub pool_file: PathBuf,
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Which `ActorPlatform` the broker drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformMode {
    #[default]
    DryRun,
    Http,
}

/// Remote platform bridge
#[derive(Debug, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub mode: PlatformMode,
    /// Bridge base URL, required when `mode = "http"`
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_platform_timeout")]
    pub timeout_secs: u64,
}

/// Monitor / dispatcher
#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    pub targets: Vec<String>,
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default = "default_stats_file")]
    pub stats_file: PathBuf,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub stop_on_claim: bool,
    #[serde(default = "default_true")]
    pub mark_claimed: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Timeout for `/assign` calls; must outlast the broker's claim timeout
    #[serde(default = "default_broker_timeout")]
    pub broker_timeout_secs: u64,
    /// Optional status listener (/health, /stats, /metrics)
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

/// Claim notification channels; each is optional.
#[derive(Debug, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub discord_webhook_url: Option<Secret<String>>,
    #[serde(default)]
    pub telegram_bot_token: Option<Secret<String>>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub telegram_api_base: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_registry_addr(),
            data_file: default_registry_file(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_broker_addr(),
            pool_file: default_pool_file(),
            claim_timeout_secs: default_claim_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_telegram_api(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            mode: PlatformMode::default(),
            base_url: None,
            timeout_secs: default_platform_timeout(),
        }
    }
}

fn default_registry_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_registry_file() -> PathBuf {
    PathBuf::from("usernames.json")
}

fn default_broker_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9000))
}

fn default_pool_file() -> PathBuf {
    PathBuf::from("account_pool.json")
}

fn default_claim_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    64
}

fn default_platform_timeout() -> u64 {
    15
}

fn default_registry_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_broker_url() -> String {
    "http://127.0.0.1:9000".into()
}

fn default_stats_file() -> PathBuf {
    PathBuf::from("stats.json")
}

fn default_poll_interval() -> u64 {
    200
}

fn default_backoff() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_broker_timeout() -> u64 {
    45
}

fn default_telegram_api() -> String {
    monitor::TELEGRAM_API_BASE.into()
}

fn require_http_url(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

fn require_non_zero(field: &str, value: u64) -> common::Result<()> {
    if value == 0 {
        return Err(common::Error::Config(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Notification credentials from the environment win over the file.
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook_url = Some(Secret::new(url));
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.notify.telegram_bot_token = Some(Secret::new(token));
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            self.notify.telegram_chat_id = Some(chat_id);
        }
    }

    fn validate(&self) -> common::Result<()> {
        require_non_zero("broker.claim_timeout_secs", self.broker.claim_timeout_secs)?;
        if self.broker.max_connections == 0 {
            return Err(common::Error::Config(
                "broker.max_connections must be greater than 0".into(),
            ));
        }

        require_non_zero("platform.timeout_secs", self.platform.timeout_secs)?;
        match (&self.platform.mode, &self.platform.base_url) {
            (PlatformMode::Http, None) => {
                return Err(common::Error::Config(
                    "platform.base_url is required when mode = \"http\"".into(),
                ));
            }
            (_, Some(url)) => require_http_url("platform.base_url", url)?,
            _ => {}
        }

        if let Some(monitor) = &self.monitor {
            if monitor.targets.is_empty() {
                return Err(common::Error::Config(
                    "monitor.targets must not be empty".into(),
                ));
            }
            if monitor.targets.iter().any(|t| t.trim().is_empty()) {
                return Err(common::Error::Config(
                    "monitor.targets must not contain empty identifiers".into(),
                ));
            }
            require_http_url("monitor.registry_url", &monitor.registry_url)?;
            require_http_url("monitor.broker_url", &monitor.broker_url)?;
            require_non_zero("monitor.poll_interval_ms", monitor.poll_interval_ms)?;
            require_non_zero("monitor.backoff_ms", monitor.backoff_ms)?;
            require_non_zero("monitor.request_timeout_secs", monitor.request_timeout_secs)?;
            if monitor.broker_timeout_secs <= self.broker.claim_timeout_secs {
                return Err(common::Error::Config(format!(
                    "monitor.broker_timeout_secs ({}) must be greater than broker.claim_timeout_secs ({})",
                    monitor.broker_timeout_secs, self.broker.claim_timeout_secs
                )));
            }
        }

        if let Some(url) = &self.notify.discord_webhook_url {
            require_http_url("notify.discord_webhook_url", url.expose())?;
        }
        require_http_url("notify.telegram_api_base", &self.notify.telegram_api_base)?;

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("handle-turbo.toml")
    }
}
