use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub mod loader;
pub mod validator;

pub use loader::{expand_env_vars, load_config, parse_config};

pub const DEFAULT_BASE_URL: &str = "https://cloud.iexapis.com";
pub const DEFAULT_CONFIG_PATH: &str = "assets/configs/loader.json";

/// Quote provider endpoint and credential.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_token: String,
}

/// Timeouts and connection cap for the outbound HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    pub batch_size: usize,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub report_interval: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Destination for outcome notifications.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationsConfig {
    Log,
    Outbox { path: PathBuf },
    Webhook { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: ProviderConfig,
    pub http: HttpConfig,
    pub refresh: RefreshConfig,
    pub retry: RetryConfig,
    pub schedule: ScheduleConfig,
    pub store: StoreConfig,
    pub notifications: NotificationsConfig,
}

impl Config {
    /// Defaults matching the production loader; only the API token has no sensible default.
    pub fn builtin() -> Self {
        Config {
            provider: ProviderConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                api_token: String::new(),
            },
            http: HttpConfig {
                connect_timeout: Duration::from_millis(5_000),
                response_timeout: Duration::from_millis(5_000),
                max_connections: 4,
            },
            refresh: RefreshConfig {
                batch_size: 50,
                concurrency: 8,
            },
            retry: RetryConfig {
                max_attempts: 5,
                base_delay: Duration::from_millis(1_000),
                max_delay: None,
            },
            schedule: ScheduleConfig {
                interval: Duration::from_secs(60),
                report_interval: Some(Duration::from_secs(5)),
            },
            store: StoreConfig {
                path: PathBuf::from("data/institutions.json"),
            },
            notifications: NotificationsConfig::Log,
        }
    }
}
