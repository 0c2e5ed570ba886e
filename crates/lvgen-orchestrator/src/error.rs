//! Orchestrator error types.

use lvgen_models::TransitionError;
use lvgen_providers::ProviderError;
use lvgen_queue::QueueError;
use lvgen_store::{LedgerError, StoreError};
use thiserror::Error;

use crate::planner::PlanError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: u32, available: u32 },

    #[error("Provider/service combination not supported: provider '{provider}', service '{service}'")]
    Unroutable { provider: String, service: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {0} is not a long-video task")]
    NotALongVideoTask(String),

    #[error("No pause in progress for task {0}")]
    NoPauseInProgress(String),

    #[error("Segment {index} out of range (task has {count} segments)")]
    SegmentOutOfRange { index: u32, count: u32 },

    #[error("Scene editing is disabled for task {0}")]
    SceneEditingDisabled(String),

    #[error("Segment {0} is paused")]
    SegmentPaused(u32),

    #[error("Segment {0} is still queued or running")]
    SegmentInFlight(u32),

    #[error("Not every segment has completed")]
    SegmentsIncomplete,

    #[error("Task {0} has not been dispatched")]
    NotDispatched(String),

    #[error("Task {id} is already {status}")]
    TaskTerminal { id: String, status: &'static str },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl OrchestratorError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unroutable(provider: impl Into<String>, service: impl Into<String>) -> Self {
        Self::Unroutable {
            provider: provider.into(),
            service: service.into(),
        }
    }

    /// Errors caused by the request itself rather than infrastructure.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Queue(_) | Self::Ledger(_))
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::TaskNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<LedgerError> for OrchestratorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientCredits { needed, available } => {
                Self::InsufficientCredits { needed, available }
            }
            other => Self::Ledger(other),
        }
    }
}

impl From<PlanError> for OrchestratorError {
    fn from(e: PlanError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<ProviderError> for OrchestratorError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::InvalidInput(msg) => Self::InvalidInput(msg),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}
