//! The lane queue contract.

use std::time::Duration;

use async_trait::async_trait;
use lvgen_models::Lane;

use crate::error::QueueResult;
use crate::job::QueueJob;

/// A job handed to one consumer. It stays owned by that consumer until
/// acknowledged; unacknowledged deliveries are recovered with
/// [`LaneQueue::claim_stale`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub lane: Lane,
    pub job: QueueJob,
    /// Times this message has been handed out, including this one
    pub delivery_count: u32,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Named, prioritized queues with ack-late delivery.
#[async_trait]
pub trait LaneQueue: Send + Sync {
    /// Place a job on its lane. Returns the message id.
    ///
    /// Enqueueing the same idempotency key twice within the dedup window
    /// fails with [`crate::QueueError::Duplicate`].
    async fn enqueue(&self, job: &QueueJob) -> QueueResult<String>;

    /// Take at most one new job from `lane` without blocking.
    async fn consume(&self, lane: Lane, consumer: &str) -> QueueResult<Option<Delivery>>;

    /// Acknowledge a finished job, removing it from the lane.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Take over deliveries that have been unacknowledged for `min_idle`.
    async fn claim_stale(
        &self,
        lane: Lane,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Move a delivery to the dead letter stream and acknowledge it.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Number of jobs currently held by the lane (ready and pending).
    async fn len(&self, lane: Lane) -> QueueResult<u64>;

    /// Drop the job's dedup reservation so the same work can be enqueued
    /// again. Called once the job has left the lane.
    async fn release(&self, job: &QueueJob) -> QueueResult<()>;
}
