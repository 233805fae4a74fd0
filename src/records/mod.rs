use serde::{Deserialize, Serialize};

pub mod store;

pub use store::{InstitutionStore, JsonFileStore, MemoryStore};

/// Tracked institution as published by the reference-data catalog, enriched with fetched quotes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Institution {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iex_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(rename = "isEnabled", default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cik: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lei: Option<String>,
    /// Fetch-ordered snapshots; `None` until the first successful quote fetch.
    #[serde(
        default,
        alias = "stockHistory",
        skip_serializing_if = "Option::is_none"
    )]
    pub quote_history: Option<Vec<QuoteSnapshot>>,
}

impl Institution {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            enabled: true,
            ..Self::default()
        }
    }

    pub fn latest_quote(&self) -> Option<&QuoteSnapshot> {
        self.quote_history.as_ref().and_then(|history| history.last())
    }

    pub fn latest_volume(&self) -> Option<f64> {
        self.latest_quote().and_then(|quote| quote.volume)
    }

    pub fn latest_change_percent(&self) -> Option<f64> {
        self.latest_quote().and_then(|quote| quote.change_percent)
    }

    pub fn history_len(&self) -> usize {
        self.quote_history.as_ref().map_or(0, Vec::len)
    }
}

/// Point-in-time quote reading. Every field is optional because the provider omits freely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_exchange: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_update: Option<i64>,
}

impl QuoteSnapshot {
    pub fn with_volume(volume: Option<f64>) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }
}
