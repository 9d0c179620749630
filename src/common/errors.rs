//! Error types for the application

use thiserror::Error;

use super::types::Side;

/// Result type alias using our CondorError
pub type Result<T> = std::result::Result<T, CondorError>;

/// Main error type for surface, strategy and startup operations
#[derive(Error, Debug)]
pub enum CondorError {
    /// A quote could not be obtained this tick
    #[error("Price unavailable for {instrument}: {reason}")]
    PriceUnavailable { instrument: String, reason: String },

    /// An order was not placed after every allowed attempt
    #[error("Order failed after {attempts} attempt(s): {side} {symbol}: {last_error}")]
    OrderFailed {
        symbol: String,
        side: Side,
        attempts: u32,
        last_error: String,
    },

    /// The broker refused the order (margin, input, ...); retrying will not help
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Network or broker-side failure talking to the execution surface
    #[error("Execution surface unreachable: {0}")]
    SurfaceUnreachable(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Semantically invalid settings, detected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Historical data could not be loaded
    #[error("Data load error: {0}")]
    DataLoad(String),

    /// CSV decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CondorError {
    /// Whether resubmitting the same request might succeed
    ///
    /// `InvalidResponse` means the broker answered but we could not read the
    /// answer; the order may well exist, so it is never resubmitted blindly.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CondorError::OrderRejected(_)
                | CondorError::Authentication(_)
                | CondorError::InvalidResponse(_)
                | CondorError::InvalidConfiguration(_)
        )
    }

    pub fn price_unavailable(instrument: impl Into<String>, reason: impl ToString) -> Self {
        CondorError::PriceUnavailable {
            instrument: instrument.into(),
            reason: reason.to_string(),
        }
    }
}
