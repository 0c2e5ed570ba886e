//! In-process lanes with the same ack-late semantics as the Redis queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lvgen_models::Lane;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::lane::{Delivery, LaneQueue};

struct PendingEntry {
    job: QueueJob,
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct LaneState {
    ready: VecDeque<(String, QueueJob)>,
    pending: HashMap<String, PendingEntry>,
}

#[derive(Default)]
struct Inner {
    lanes: HashMap<Lane, LaneState>,
    dedup: HashSet<String>,
    dead: Vec<(QueueJob, String)>,
    next_id: u64,
}

/// Lane queue held in memory.
#[derive(Default)]
pub struct InMemoryLaneQueue {
    inner: Mutex<Inner>,
}

impl InMemoryLaneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Jobs moved to the dead letter list, with their error.
    pub fn dead_letters(&self) -> Vec<(QueueJob, String)> {
        self.lock().dead.clone()
    }

    /// Deliveries handed out but not yet acknowledged.
    pub fn pending_count(&self, lane: Lane) -> usize {
        self.lock().lanes.get(&lane).map_or(0, |s| s.pending.len())
    }

    /// Jobs not yet handed to any consumer, in delivery order.
    pub fn ready_jobs(&self, lane: Lane) -> Vec<QueueJob> {
        self.lock()
            .lanes
            .get(&lane)
            .map(|s| s.ready.iter().map(|(_, job)| job.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LaneQueue for InMemoryLaneQueue {
    async fn enqueue(&self, job: &QueueJob) -> QueueResult<String> {
        let mut inner = self.lock();
        let key = job.idempotency_key();
        if !inner.dedup.insert(key.clone()) {
            warn!("Duplicate job rejected: {}", key);
            return Err(QueueError::Duplicate(key));
        }

        inner.next_id += 1;
        let message_id = format!("{}-0", inner.next_id);
        inner
            .lanes
            .entry(job.lane())
            .or_default()
            .ready
            .push_back((message_id.clone(), job.clone()));

        debug!(lane = %job.lane(), job_id = %job.job_id(), "Enqueued job in memory");
        Ok(message_id)
    }

    async fn consume(&self, lane: Lane, consumer: &str) -> QueueResult<Option<Delivery>> {
        let mut inner = self.lock();
        let state = inner.lanes.entry(lane).or_default();
        let Some((message_id, job)) = state.ready.pop_front() else {
            return Ok(None);
        };

        state.pending.insert(
            message_id.clone(),
            PendingEntry {
                job: job.clone(),
                consumer: consumer.to_string(),
                delivered_at: Instant::now(),
                delivery_count: 1,
            },
        );

        Ok(Some(Delivery {
            message_id,
            lane,
            job,
            delivery_count: 1,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut inner = self.lock();
        let removed = inner
            .lanes
            .get_mut(&delivery.lane)
            .and_then(|s| s.pending.remove(&delivery.message_id));
        match removed {
            Some(_) => Ok(()),
            None => Err(QueueError::UnknownDelivery(delivery.message_id.clone())),
        }
    }

    async fn claim_stale(
        &self,
        lane: Lane,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut inner = self.lock();
        let state = inner.lanes.entry(lane).or_default();

        let mut stale: Vec<&String> = state
            .pending
            .iter()
            .filter(|(_, entry)| entry.delivered_at.elapsed() >= min_idle)
            .map(|(id, _)| id)
            .collect();
        stale.sort();
        let stale: Vec<String> = stale.into_iter().take(count).cloned().collect();

        let mut deliveries = Vec::with_capacity(stale.len());
        for message_id in stale {
            if let Some(entry) = state.pending.get_mut(&message_id) {
                debug!(lane = %lane, from = %entry.consumer, to = %consumer, "Claiming stale delivery {}", message_id);
                entry.consumer = consumer.to_string();
                entry.delivered_at = Instant::now();
                entry.delivery_count += 1;
                deliveries.push(Delivery {
                    message_id,
                    lane,
                    job: entry.job.clone(),
                    delivery_count: entry.delivery_count,
                });
            }
        }
        Ok(deliveries)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        self.lock()
            .dead
            .push((delivery.job.clone(), error.to_string()));
        self.ack(delivery).await?;
        warn!(lane = %delivery.lane, "Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    async fn len(&self, lane: Lane) -> QueueResult<u64> {
        let inner = self.lock();
        Ok(inner
            .lanes
            .get(&lane)
            .map_or(0, |s| (s.ready.len() + s.pending.len()) as u64))
    }

    async fn release(&self, job: &QueueJob) -> QueueResult<()> {
        self.lock().dedup.remove(&job.idempotency_key());
        Ok(())
    }
}
