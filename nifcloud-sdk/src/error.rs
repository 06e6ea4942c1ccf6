//! Client error types

use thiserror::Error;

/// Errors returned by the NIFCLOUD client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error document
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body could not be decoded
    #[error("Invalid XML response: {0}")]
    Xml(String),

    /// The request could not be signed
    #[error("Failed to sign request: {0}")]
    Signing(String),

    /// Missing or invalid client configuration
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// API error code, if the error came from the API
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the API reported the target as nonexistent
    pub fn is_not_found(&self) -> bool {
        self.code()
            .is_some_and(|c| c.contains("NotFound") || c.starts_with("NoSuch"))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
