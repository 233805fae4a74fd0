use crate::error::{AppError, Result};

use super::{Config, NotificationsConfig};

/// Validate a loaded configuration, aggregating every issue into one error.
pub fn validate_config(config: &Config) -> Result<()> {
    let mut issues = Vec::new();

    validate_provider(config, &mut issues);
    validate_http(config, &mut issues);
    validate_refresh(config, &mut issues);
    validate_retry(config, &mut issues);
    validate_schedule(config, &mut issues);
    validate_notifications(config, &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::message(format!(
            "loader config invalid:\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

fn validate_provider(config: &Config, issues: &mut Vec<String>) {
    let base_url = config.provider.base_url.trim();
    if base_url.is_empty() {
        issues.push("provider.base_url must not be empty".to_string());
    } else if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        issues.push(format!(
            "provider.base_url `{base_url}` must start with http:// or https://"
        ));
    }

    if config.provider.api_token.trim().is_empty() {
        issues.push("provider.api_token must not be empty".to_string());
    }
}

fn validate_http(config: &Config, issues: &mut Vec<String>) {
    if config.http.connect_timeout.is_zero() {
        issues.push("http.connect_timeout_ms must be greater than zero".to_string());
    }
    if config.http.response_timeout.is_zero() {
        issues.push("http.response_timeout_ms must be greater than zero".to_string());
    }
    if config.http.max_connections == 0 {
        issues.push("http.max_connections must be at least 1".to_string());
    }
}

fn validate_refresh(config: &Config, issues: &mut Vec<String>) {
    if config.refresh.concurrency == 0 {
        issues.push("refresh.concurrency must be at least 1".to_string());
    }
}

fn validate_retry(config: &Config, issues: &mut Vec<String>) {
    if config.retry.max_attempts == 0 {
        issues.push("retry.max_attempts must be at least 1".to_string());
    }
    if let Some(max_delay) = config.retry.max_delay {
        if max_delay < config.retry.base_delay {
            issues.push(format!(
                "retry.max_delay_ms ({}) is smaller than retry.base_delay_ms ({})",
                max_delay.as_millis(),
                config.retry.base_delay.as_millis()
            ));
        }
    }
}

fn validate_schedule(config: &Config, issues: &mut Vec<String>) {
    if config.schedule.interval.is_zero() {
        issues.push("schedule.interval_secs must be greater than zero".to_string());
    }
}

fn validate_notifications(config: &Config, issues: &mut Vec<String>) {
    match &config.notifications {
        NotificationsConfig::Log => {}
        NotificationsConfig::Outbox { path } => {
            if path.as_os_str().is_empty() {
                issues.push("notifications.path must not be empty".to_string());
            }
        }
        NotificationsConfig::Webhook { url } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                issues.push(format!(
                    "notifications.url `{url}` must start with http:// or https://"
                ));
            }
        }
    }
}
