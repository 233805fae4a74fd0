use std::sync::Arc;

use log::{debug, error};

use crate::error::{FetchError, RefreshError};
use crate::notify::{NotificationEmitter, NotificationRecord};
use crate::records::{Institution, QuoteSnapshot};
use crate::services::history::merge_quote;

use super::client::{QuoteTransport, RawResponse};
use super::request::ProviderEndpoints;
use super::retry::{RetryError, RetryPolicy};

/// Result of one classified quote response.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteFetch {
    Snapshot(QuoteSnapshot),
    /// Non-success status, non-JSON or empty payload: nothing to record this run.
    NoData,
}

/// Map a provider response onto the retry contract.
///
/// 429 is retryable; any other non-success status, a non-JSON body or a JSON object without
/// quote fields resolves to [`QuoteFetch::NoData`]. A body that fails to decode is terminal.
pub fn classify_response(symbol: &str, response: &RawResponse) -> Result<QuoteFetch, FetchError> {
    if response.status.as_u16() == 429 {
        return Err(FetchError::RateLimited);
    }

    if !response.status.is_success() {
        debug!(
            "Stock loading failed. The reason is {}. {}",
            response.status.canonical_reason().unwrap_or("unexpected status"),
            symbol
        );
        return Ok(QuoteFetch::NoData);
    }

    if !response.is_json() || response.is_blank() {
        return Ok(QuoteFetch::NoData);
    }

    let snapshot = serde_json::from_slice::<QuoteSnapshot>(&response.body)
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    // An object with none of the quote fields (an error envelope, `{}`) is not a reading.
    if snapshot == QuoteSnapshot::default() {
        debug!("Quote for {symbol} carried no quote fields");
        return Ok(QuoteFetch::NoData);
    }
    Ok(QuoteFetch::Snapshot(snapshot))
}

/// Fetches one institution's quote with retry, merging any snapshot into its history.
#[derive(Clone)]
pub struct QuoteFetcher {
    transport: Arc<dyn QuoteTransport>,
    endpoints: Arc<ProviderEndpoints>,
    policy: RetryPolicy,
    emitter: NotificationEmitter,
}

impl QuoteFetcher {
    pub fn new(
        transport: Arc<dyn QuoteTransport>,
        endpoints: Arc<ProviderEndpoints>,
        policy: RetryPolicy,
        emitter: NotificationEmitter,
    ) -> Self {
        Self {
            transport,
            endpoints,
            policy,
            emitter,
        }
    }

    /// Request, classify and retry as a single unit.
    pub async fn request_quote(&self, symbol: &str) -> Result<QuoteFetch, RetryError> {
        debug!("Prepare REST request to receive single institution info by stock {symbol}");
        let url = self.endpoints.quote_url(symbol);
        let url = url.as_str();
        let transport = &self.transport;
        self.policy
            .run(symbol, |_| async move {
                let response = transport.get(url).await?;
                classify_response(symbol, &response)
            })
            .await
    }

    /// Refresh one institution. On retry exhaustion an ERROR notification is emitted
    /// before the failure is returned.
    pub async fn refresh(&self, institution: Institution) -> Result<Institution, RefreshError> {
        let symbol = institution.symbol.clone();
        match self.request_quote(&symbol).await {
            Ok(QuoteFetch::Snapshot(snapshot)) => Ok(merge_quote(institution, snapshot)),
            Ok(QuoteFetch::NoData) => Ok(institution),
            Err(RetryError::Exhausted { attempts, last }) => {
                error!("Giving up on {symbol} after {attempts} attempts: {last}");
                self.emitter
                    .emit_one(NotificationRecord::error(symbol.clone()))
                    .await;
                Err(RefreshError::TooManyRequests {
                    symbol,
                    reason: format!("{last} after {attempts} attempts"),
                })
            }
            Err(RetryError::Terminal(err)) => {
                error!("Quote for {symbol} rejected: {err}");
                Err(RefreshError::MalformedQuote {
                    symbol,
                    reason: err.to_string(),
                })
            }
        }
    }
}
