//! Outcome notifications and their dispatch to the outbound channel.
//!
//! Records are fire-and-forget: once handed to a [`NotificationChannel`] the
//! loader never reads them back, and delivery failures are only logged.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub mod channels;

pub use channels::{build_channel, LogChannel, OutboxChannel, WebhookChannel};

/// Actor stamped on records emitted by the loader.
pub const LOADER_ACTOR: &str = "finance-loader";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeStatus {
    New,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub status: NoticeStatus,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    /// Symbol of the institution the record refers to, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl NotificationRecord {
    pub fn new(status: NoticeStatus, kind: NoticeKind) -> Self {
        let now = Utc::now();
        Self {
            status,
            kind,
            created: now,
            modified: now,
            created_by: None,
            modified_by: None,
            subject: None,
        }
    }

    /// Completed refresh of one institution.
    pub fn info(subject: impl Into<String>) -> Self {
        Self::new(NoticeStatus::New, NoticeKind::Info).with_subject(subject)
    }

    /// Retry exhaustion for one institution.
    pub fn error(subject: impl Into<String>) -> Self {
        Self::new(NoticeStatus::New, NoticeKind::Error).with_subject(subject)
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn stamp_actor(&mut self, actor: &str) {
        if self.created_by.is_none() {
            self.created_by = Some(actor.to_string());
        }
        if self.modified_by.is_none() {
            self.modified_by = Some(actor.to_string());
        }
    }
}

/// Outbound channel accepting notification payloads (queue, webhook, log...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, record: &NotificationRecord) -> Result<(), ChannelError>;

    async fn send_many(&self, records: &[NotificationRecord]) -> Result<(), ChannelError>;
}

/// Stamps records and hands them to the channel. Never retries and never fails the caller.
#[derive(Clone)]
pub struct NotificationEmitter {
    channel: Arc<dyn NotificationChannel>,
    actor: String,
}

impl NotificationEmitter {
    pub fn new(channel: Arc<dyn NotificationChannel>) -> Self {
        Self {
            channel,
            actor: LOADER_ACTOR.to_string(),
        }
    }

    /// Returns whether the channel accepted the record.
    pub async fn emit_one(&self, mut record: NotificationRecord) -> bool {
        record.stamp_actor(&self.actor);
        match self.channel.send(&record).await {
            Ok(()) => {
                debug!(
                    "Dispatched {:?} notification for {}",
                    record.kind,
                    record.subject.as_deref().unwrap_or("-")
                );
                true
            }
            Err(err) => {
                error!("Failed to dispatch notification: {err}");
                false
            }
        }
    }

    /// Returns whether the channel accepted the batch. Empty batches are not sent.
    pub async fn emit_many(&self, mut records: Vec<NotificationRecord>) -> bool {
        if records.is_empty() {
            return true;
        }
        for record in &mut records {
            record.stamp_actor(&self.actor);
        }
        match self.channel.send_many(&records).await {
            Ok(()) => {
                debug!("Dispatched {} notifications", records.len());
                true
            }
            Err(err) => {
                error!("Failed to dispatch {} notifications: {err}", records.len());
                false
            }
        }
    }
}
