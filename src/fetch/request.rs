use crate::config::ProviderConfig;

const SYMBOLS_PATH: &str = "/stable/ref-data/symbols";

/// Builds provider URLs with the API token attached as a query parameter.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    base_url: String,
    token: String,
}

impl ProviderEndpoints {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_token.clone())
    }

    pub fn symbols_url(&self) -> String {
        format!(
            "{}{}?token={}",
            self.base_url,
            SYMBOLS_PATH,
            urlencoding::encode(&self.token)
        )
    }

    pub fn quote_url(&self, symbol: &str) -> String {
        format!(
            "{}/stable/stock/{}/quote?token={}",
            self.base_url,
            urlencoding::encode(symbol),
            urlencoding::encode(&self.token)
        )
    }
}

/// Strip the credential from a URL before it reaches the logs.
pub fn redact_token(url: &str) -> String {
    match url.find("token=") {
        Some(idx) => {
            let value_start = idx + "token=".len();
            let rest = &url[value_start..];
            let value_end = rest.find('&').map_or(url.len(), |end| value_start + end);
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}
