//! Store and ledger error types.

use thiserror::Error;

/// Result type for task store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic update lost the race too many times.
    #[error("Concurrent update conflict on {0}")]
    Conflict(String),

    /// The mutation refused to apply; nothing was written.
    #[error("Update aborted")]
    Aborted,

    #[error("Invalid service catalog: {0}")]
    InvalidCatalog(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_catalog(msg: impl Into<String>) -> Self {
        Self::InvalidCatalog(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Infrastructure failures that a redelivery may get past.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Redis(_) | Self::Io(_))
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Ledger rejected request: {0}")]
    Rejected(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn insufficient(needed: u32, available: u32) -> Self {
        Self::InsufficientCredits { needed, available }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientCredits { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(StoreError::Conflict("t".into()).is_retryable());
        assert!(!StoreError::not_found("t").is_retryable());
        assert!(LedgerError::unavailable("503").is_retryable());
        assert!(!LedgerError::insufficient(3, 1).is_retryable());
        assert!(LedgerError::insufficient(3, 1).is_insufficient());
    }

    #[test]
    fn test_insufficient_message() {
        let err = LedgerError::insufficient(5, 2);
        assert_eq!(err.to_string(), "Insufficient credits: need 5, have 2");
    }
}
