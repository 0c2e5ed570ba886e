//! Provider error taxonomy.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

const MAX_BODY_IN_ERROR: usize = 500;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Input rejected before anything was sent to the backend
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backend reported a failure (content policy, bad model, malformed output)
    #[error("Provider failed: {0}")]
    ProviderFailed(String),

    /// Polling exceeded the hard limit
    #[error("Provider timed out after {elapsed_secs}s")]
    ProviderTimeout { elapsed_secs: u64 },

    #[error("Provider job cancelled")]
    ProviderCancelled,

    /// Network or availability problem; safe to retry
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ProviderFailed(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientNetwork(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn malformed(what: impl std::fmt::Display) -> Self {
        Self::ProviderFailed(format!("malformed response: {what}"))
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let body: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
        let msg = format!("HTTP {}: {}", status.as_u16(), body);
        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
        {
            Self::TransientNetwork(msg)
        } else {
            Self::ProviderFailed(msg)
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Short class name used in failure messages and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ProviderFailed(_) => "provider_failed",
            Self::ProviderTimeout { .. } => "provider_timeout",
            Self::ProviderCancelled => "provider_cancelled",
            Self::TransientNetwork(_) => "transient_network_error",
            Self::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::malformed(e);
        }
        if let Some(status) = e.status() {
            return Self::from_status(status, &e.to_string());
        }
        Self::TransientNetwork(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::from_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        let policy = ProviderError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "nsfw");
        assert!(!policy.is_retryable());
        assert_eq!(policy.class(), "provider_failed");
        assert!(policy.to_string().contains("nsfw"));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(!ProviderError::ProviderTimeout { elapsed_secs: 1 }.is_retryable());
        assert!(!ProviderError::ProviderCancelled.is_retryable());
        assert!(!ProviderError::invalid_input("x").is_retryable());
    }
}
