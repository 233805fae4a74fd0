use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use tokio::sync::Semaphore;

use crate::config::HttpConfig;
use crate::error::{Context, FetchError, Result};

use super::ensure_concurrency_limit;
use super::request::redact_token;

/// Status, content type and body of a provider response, before classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.content_type.as_deref().is_some_and(is_json_media_type)
    }

    /// A body of only whitespace or a JSON `null` carries nothing.
    pub fn is_blank(&self) -> bool {
        let text = String::from_utf8_lossy(&self.body);
        let trimmed = text.trim();
        trimmed.is_empty() || trimmed == "null"
    }
}

fn is_json_media_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// GET transport to the quote provider. Only transport-level failures are errors here.
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, FetchError>;
}

/// reqwest-backed transport with connect and response timeouts.
pub struct IexClient {
    client: Client,
}

impl IexClient {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout)
            .timeout(http.response_timeout)
            .pool_max_idle_per_host(ensure_concurrency_limit(http.max_connections))
            .build()
            .context("Failed to construct HTTP client")?;

        Ok(Self { client })
    }

    /// Underlying client, shared with other outbound adapters.
    pub fn http_client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl QuoteTransport for IexClient {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, FetchError> {
        debug!("GET {}", redact_token(url));
        let response = self.client.get(url).send().await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Caps the requests in flight on the wrapped transport, independent of the refresh fan-out.
pub struct ConnectionCap {
    inner: Arc<dyn QuoteTransport>,
    permits: Semaphore,
}

impl ConnectionCap {
    pub fn new(inner: Arc<dyn QuoteTransport>, max_connections: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(ensure_concurrency_limit(max_connections)),
        }
    }
}

#[async_trait]
impl QuoteTransport for ConnectionCap {
    async fn get(&self, url: &str) -> std::result::Result<RawResponse, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Transport("connection pool closed".to_string()))?;
        self.inner.get(url).await
    }
}
