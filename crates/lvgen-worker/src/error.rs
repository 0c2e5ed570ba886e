//! Errors surfaced by job processing.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job can never succeed as written; redelivery would repeat the failure.
    #[error("unprocessable job: {0}")]
    Unprocessable(String),

    #[error(transparent)]
    Orchestrator(#[from] lvgen_orchestrator::OrchestratorError),

    #[error("task store: {0}")]
    Store(#[from] lvgen_store::StoreError),

    #[error("credit ledger: {0}")]
    Ledger(#[from] lvgen_store::LedgerError),

    #[error("lane queue: {0}")]
    Queue(#[from] lvgen_queue::QueueError),

    #[error("post-processing: {0}")]
    Media(#[from] lvgen_media::MediaError),

    #[error("blob mirror: {0}")]
    Storage(#[from] lvgen_storage::StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn unprocessable(reason: impl Into<String>) -> Self {
        Self::Unprocessable(reason.into())
    }

    /// Whether leaving the job for redelivery could change the outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Orchestrator(e) => !e.is_client_error(),
            Self::Store(e) => e.is_retryable(),
            Self::Ledger(e) => e.is_retryable(),
            Self::Storage(e) => e.is_transient(),
            Self::Queue(_) | Self::Io(_) => true,
            Self::Unprocessable(_) | Self::Media(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvgen_orchestrator::OrchestratorError;

    #[test]
    fn test_retryable_classification() {
        assert!(!WorkerError::unprocessable("bad payload").is_retryable());
        assert!(!WorkerError::from(OrchestratorError::SegmentsIncomplete).is_retryable());
        assert!(WorkerError::from(std::io::Error::other("disk")).is_retryable());
        assert!(!WorkerError::from(lvgen_storage::StorageError::MissingConfig("R2_BUCKET_NAME".into())).is_retryable());
    }
}
