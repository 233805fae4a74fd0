use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::NotificationsConfig;
use crate::error::ChannelError;

use super::{NotificationChannel, NotificationRecord};

/// Build the channel selected in configuration.
pub fn build_channel(config: &NotificationsConfig, client: Client) -> Arc<dyn NotificationChannel> {
    match config {
        NotificationsConfig::Log => Arc::new(LogChannel),
        NotificationsConfig::Outbox { path } => Arc::new(OutboxChannel::new(path.clone())),
        NotificationsConfig::Webhook { url } => Arc::new(WebhookChannel::new(client, url.clone())),
    }
}

/// Writes each message to the log at info level.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        info!("notification {}", serde_json::to_string(record)?);
        Ok(())
    }

    async fn send_many(&self, records: &[NotificationRecord]) -> Result<(), ChannelError> {
        info!("notifications {}", serde_json::to_string(records)?);
        Ok(())
    }
}

/// Appends one JSON message per line; a batch is a single line holding an array.
pub struct OutboxChannel {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn append<T: Serialize + ?Sized + Sync>(&self, message: &T) -> Result<(), ChannelError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for OutboxChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        self.append(record).await
    }

    async fn send_many(&self, records: &[NotificationRecord]) -> Result<(), ChannelError> {
        self.append(records).await
    }
}

/// POSTs messages as JSON to a queue gateway or webhook.
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post<T: Serialize + ?Sized + Sync>(&self, message: &T) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|err| ChannelError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChannelError::Rejected(status.as_u16()))
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        self.post(record).await
    }

    async fn send_many(&self, records: &[NotificationRecord]) -> Result<(), ChannelError> {
        self.post(records).await
    }
}
