//! Lane queue errors.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The idempotency key is still reserved by an earlier enqueue.
    #[error("job {0} is already queued")]
    Duplicate(String),

    #[error("could not append to {stream}: {reason}")]
    Append { stream: String, reason: String },

    /// Ack or dead-letter for a message this queue never delivered.
    #[error("no outstanding delivery {0}")]
    UnknownDelivery(String),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl QueueError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
