//! In-process fakes for the provider transport and notification channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::error::{ChannelError, FetchError};
use crate::fetch::{QuoteTransport, RawResponse};
use crate::notify::{NotificationChannel, NotificationRecord};

/// Replays queued responses per URL; an unscripted URL answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<RawResponse, FetchError>>>>,
    requested: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    pub fn push(&self, url: &str, response: Result<RawResponse, FetchError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl QuoteTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
        self.requested
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(RawResponse::json(StatusCode::NOT_FOUND, "{}")))
    }
}

/// Answers every GET with a quote after `delay`, recording the peak number of calls in flight.
pub struct TrackingTransport {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl TrackingTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteTransport for TrackingTransport {
    async fn get(&self, _url: &str) -> Result<RawResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RawResponse::json(StatusCode::OK, r#"{"volume":1.0}"#))
    }
}

/// Keeps every record it is handed; optionally rejects everything.
#[derive(Default)]
pub struct RecordingChannel {
    records: Mutex<Vec<NotificationRecord>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingChannel {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, record: &NotificationRecord) -> Result<(), ChannelError> {
        self.send_many(std::slice::from_ref(record)).await
    }

    async fn send_many(&self, records: &[NotificationRecord]) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ChannelError::Transport("queue unavailable".to_string()));
        }
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}
