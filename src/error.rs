use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }
}

/// Outcome of a single provider attempt that did not yield a usable response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limited by provider (HTTP 429)")]
    RateLimited,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("provider answered with status {0}")]
    Status(u16),
    #[error("malformed payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// Only rate limiting and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::RateLimited | FetchError::Transport(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Terminal failure for one institution; never escapes the refresh pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("too many requests for {symbol}: {reason}")]
    TooManyRequests { symbol: String, reason: String },
    #[error("quote for {symbol} could not be decoded: {reason}")]
    MalformedQuote { symbol: String, reason: String },
}

impl RefreshError {
    pub fn symbol(&self) -> &str {
        match self {
            RefreshError::TooManyRequests { symbol, .. }
            | RefreshError::MalformedQuote { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("no institutions have been persisted yet")]
    NoData,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification channel rejected payload with status {0}")]
    Rejected(u16),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
