use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{AppError, Context, Result};

use super::{validator, Config, NotificationsConfig};

/// Read the loader configuration from disk, expand `${VAR}` placeholders and validate it.
pub fn load_config(path: &Path) -> Result<Config> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read loader config at {}", path.display()))?;

    parse_config(&json).map_err(|err| {
        AppError::message(format!(
            "loader config {} rejected: {}",
            path.display(),
            err
        ))
    })
}

/// Parse configuration from a JSON document. Omitted sections keep their built-in defaults.
pub fn parse_config(json: &str) -> Result<Config> {
    let raw: RawConfig =
        serde_json::from_str(json).context("failed to parse loader config JSON")?;
    let config = raw.into_config()?;
    validator::validate_config(&config)?;
    Ok(config)
}

/// Substitute `${NAME}` with the value of environment variable `NAME`.
pub fn expand_env_vars(value: &str) -> Result<String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            while let Some(&next) = chars.peek() {
                chars.next();
                if next == '}' {
                    closed = true;
                    break;
                }
                name.push(next);
            }

            if name.is_empty() {
                return Err(AppError::message(
                    "Encountered empty environment placeholder in config",
                ));
            }

            if !closed {
                return Err(AppError::message(
                    "Unterminated environment placeholder in config",
                ));
            }

            let value = std::env::var(&name).with_context(|| {
                format!(
                    "Environment variable {} required by loader config is not set",
                    name
                )
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    provider: RawProvider,
    #[serde(default)]
    http: RawHttp,
    #[serde(default)]
    refresh: RawRefresh,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default)]
    schedule: RawSchedule,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    notifications: Option<NotificationsConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawProvider {
    base_url: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawHttp {
    connect_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRefresh {
    batch_size: Option<usize>,
    concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSchedule {
    interval_secs: Option<u64>,
    report_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawStore {
    path: Option<String>,
}

impl RawConfig {
    fn into_config(self) -> Result<Config> {
        let mut config = Config::builtin();

        if let Some(base_url) = self.provider.base_url {
            config.provider.base_url = expand_env_vars(&base_url)?
                .trim_end_matches('/')
                .to_string();
        }
        if let Some(token) = self.provider.api_token {
            config.provider.api_token = expand_env_vars(&token)?;
        }

        if let Some(ms) = self.http.connect_timeout_ms {
            config.http.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.http.response_timeout_ms {
            config.http.response_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = self.http.max_connections {
            config.http.max_connections = max;
        }

        if let Some(size) = self.refresh.batch_size {
            config.refresh.batch_size = size;
        }
        if let Some(width) = self.refresh.concurrency {
            config.refresh.concurrency = width;
        }

        if let Some(attempts) = self.retry.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = self.retry.base_delay_ms {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry.max_delay_ms {
            config.retry.max_delay = Some(Duration::from_millis(ms));
        }

        if let Some(secs) = self.schedule.interval_secs {
            config.schedule.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.schedule.report_interval_secs {
            // Zero disables the standalone ranking report.
            config.schedule.report_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(path) = self.store.path {
            config.store.path = expand_env_vars(&path)?.into();
        }

        if let Some(notifications) = self.notifications {
            config.notifications = match notifications {
                NotificationsConfig::Log => NotificationsConfig::Log,
                NotificationsConfig::Outbox { path } => NotificationsConfig::Outbox {
                    path: expand_env_vars(&path.to_string_lossy())?.into(),
                },
                NotificationsConfig::Webhook { url } => NotificationsConfig::Webhook {
                    url: expand_env_vars(&url)?,
                },
            };
        }

        Ok(config)
    }
}
