//! Provider error types

use thiserror::Error;

/// Network or parse failure in an external provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request could not be sent or the body could not be read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with an unexpected status
    #[error("{provider} returned status {status}")]
    Status { provider: &'static str, status: u16 },

    /// Response body did not have the expected shape
    #[error("Failed to parse {provider} response: {message}")]
    Parse {
        provider: &'static str,
        message: String,
    },

    /// URL construction failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ProviderError {
    pub fn parse(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            message: message.into(),
        }
    }
}
