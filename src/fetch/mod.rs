pub mod client;
pub mod directory;
pub mod quotes;
pub mod request;
pub mod retry;

pub use client::{ConnectionCap, IexClient, QuoteTransport, RawResponse};
pub use directory::DirectoryFetcher;
pub use quotes::{classify_response, QuoteFetch, QuoteFetcher};
pub use request::ProviderEndpoints;
pub use retry::{RetryError, RetryPolicy};

/// Default fan-out width for quote refreshes.
pub const REFRESH_CONCURRENCY_LIMIT: usize = 8;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}
