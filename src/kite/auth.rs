//! Authentication utilities for Kite Connect

use sha2::{Digest, Sha256};

/// Checksum sent with `POST /session/token`
///
/// Hex-encoded SHA-256 of `api_key + request_token + api_secret`.
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Credentials for authenticated requests
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub api_key: String,
    pub access_token: String,
}

impl AuthHeaders {
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    /// Add the `Authorization` header to a reqwest RequestBuilder
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(
            "Authorization",
            format!("token {}:{}", self.api_key, self.access_token),
        )
    }
}
