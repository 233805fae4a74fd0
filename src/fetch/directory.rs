use std::sync::Arc;

use log::{debug, info};

use crate::error::FetchError;
use crate::records::Institution;

use super::client::QuoteTransport;
use super::request::ProviderEndpoints;

/// Pulls the full reference-data catalog in a single request. Never retried.
pub struct DirectoryFetcher {
    transport: Arc<dyn QuoteTransport>,
    endpoints: Arc<ProviderEndpoints>,
}

impl DirectoryFetcher {
    pub fn new(transport: Arc<dyn QuoteTransport>, endpoints: Arc<ProviderEndpoints>) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Institutions in provider order; a `null` or empty body yields an empty list.
    pub async fn fetch_all(&self) -> Result<Vec<Institution>, FetchError> {
        debug!("REST request to get all institutions.");
        let response = self.transport.get(&self.endpoints.symbols_url()).await?;

        if response.status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !response.status.is_success() {
            return Err(FetchError::Status(response.status.as_u16()));
        }
        if response.is_blank() {
            info!("Institution directory returned no body.");
            return Ok(Vec::new());
        }

        let institutions: Option<Vec<Institution>> = serde_json::from_slice(&response.body)
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        let institutions = institutions.unwrap_or_default();
        info!("Institutions received {}.", institutions.len());
        Ok(institutions)
    }
}
