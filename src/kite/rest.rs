//! REST API client for Kite Connect v3

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::auth::{session_checksum, AuthHeaders};
use super::messages::*;
use crate::common::errors::{CondorError, Result};

const KITE_VERSION: &str = "3";

/// REST API client for Kite Connect
#[derive(Debug, Clone)]
pub struct KiteRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the REST API
    base_url: String,
    /// Credentials for authenticated endpoints
    auth: Option<AuthHeaders>,
}

impl KiteRestClient {
    /// Create a new REST client (unauthenticated)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CondorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: None,
        })
    }

    /// Set API key and access token for authenticated requests
    pub fn with_credentials(mut self, api_key: &str, access_token: &str) -> Self {
        self.auth = Some(AuthHeaders::new(api_key, access_token));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("X-Kite-Version", KITE_VERSION);
        match &self.auth {
            Some(auth) => auth.apply_to_request(builder),
            None => builder,
        }
    }

    // ========================================================================
    // Market data
    // ========================================================================

    /// Last traded price for each instrument (`EXCHANGE:TRADINGSYMBOL`)
    #[instrument(skip(self))]
    pub async fn get_ltp(&self, instruments: &[&str]) -> Result<BTreeMap<String, Decimal>> {
        let url = format!("{}/quote/ltp", self.base_url);
        let query: Vec<(&str, &str)> = instruments.iter().map(|i| ("i", *i)).collect();
        debug!("Fetching LTP from: {}", url);

        let response = self
            .request(self.client.get(&url).query(&query))
            .send()
            .await
            .map_err(transport_error)?;

        let quotes: LtpResponse = parse_envelope(response).await?;
        Ok(quotes
            .into_iter()
            .map(|(instrument, quote)| (instrument, quote.last_price))
            .collect())
    }

    // ========================================================================
    // Orders and portfolio
    // ========================================================================

    /// Place a regular order, returning the broker order id
    #[instrument(skip(self))]
    pub async fn place_order(&self, params: &OrderParams) -> Result<String> {
        let url = format!("{}/orders/regular", self.base_url);
        debug!("Placing order: {} {} x{}", params.transaction_type, params.tradingsymbol, params.quantity);

        let response = self
            .request(self.client.post(&url).form(params))
            .send()
            .await
            .map_err(transport_error)?;

        let placed: OrderPlacedResponse = parse_envelope(response).await?;
        Ok(placed.order_id)
    }

    /// Today's order book
    #[instrument(skip(self))]
    pub async fn get_orders(&self) -> Result<Vec<KiteOrder>> {
        let url = format!("{}/orders", self.base_url);
        debug!("Fetching orders from: {}", url);

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        parse_envelope(response).await
    }

    /// Net and day positions
    #[instrument(skip(self))]
    pub async fn get_positions(&self) -> Result<PositionsResponse> {
        let url = format!("{}/portfolio/positions", self.base_url);
        debug!("Fetching positions from: {}", url);

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        parse_envelope(response).await
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Exchange a login request token for an access token
    #[instrument(skip(self, api_secret))]
    pub async fn generate_session(
        &self,
        api_key: &str,
        request_token: &str,
        api_secret: &str,
    ) -> Result<SessionResponse> {
        let url = format!("{}/session/token", self.base_url);
        let checksum = session_checksum(api_key, request_token, api_secret);
        let form = [
            ("api_key", api_key),
            ("request_token", request_token),
            ("checksum", checksum.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("X-Kite-Version", KITE_VERSION)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        parse_envelope(response).await
    }
}

fn transport_error(e: reqwest::Error) -> CondorError {
    CondorError::SurfaceUnreachable(e.to_string())
}

/// Unwrap the `{status, data, message, error_type}` envelope
async fn parse_envelope<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    let envelope: KiteEnvelope<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(CondorError::InvalidResponse(format!(
                "Unparseable response: {}",
                e
            )))
        }
        Err(_) => {
            return Err(CondorError::SurfaceUnreachable(format!(
                "Server returned status {}: {}",
                status, body
            )))
        }
    };

    if status.is_success() && envelope.status == "success" {
        return envelope
            .data
            .ok_or_else(|| CondorError::InvalidResponse("Response has no data".to_string()));
    }

    let message = envelope
        .message
        .unwrap_or_else(|| format!("Server returned status {}", status));
    Err(
        match KiteErrorKind::from_error_type(envelope.error_type.as_deref()) {
            KiteErrorKind::Token => CondorError::Authentication(message),
            KiteErrorKind::Rejected => CondorError::OrderRejected(message),
            KiteErrorKind::Other => CondorError::SurfaceUnreachable(message),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = KiteRestClient::new("https://api.kite.trade");
        assert!(client.is_ok());
    }

    #[test]
    fn test_url_normalization() {
        let client = KiteRestClient::new("https://api.kite.trade/").unwrap();
        assert!(!client.base_url().ends_with('/'));
    }
}
