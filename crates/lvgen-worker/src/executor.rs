//! Lane executor.
//!
//! One job at a time: the executor takes at most one delivery from its
//! lanes (highest priority first), runs it to the end and acknowledges it
//! only afterwards. Infrastructure failures leave the delivery pending so it
//! is redelivered; after `max_deliveries` it is dead-lettered. The executor
//! stops after `max_jobs` acknowledged jobs so the supervisor can restart
//! it; deliveries left for redelivery or dead-lettered do not count.

use std::sync::Arc;
use std::time::Instant;

use lvgen_queue::{Delivery, LaneQueue};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::JobProcessor;
use crate::retry::FailureTracker;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDisposition {
    /// Finished and acknowledged
    Acked,
    /// Failed and left pending for redelivery
    Retrying(String),
    /// Moved to the dead letter stream
    DeadLettered(String),
}

impl JobDisposition {
    /// The job ran to the end and was acknowledged.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Acked)
    }
}

/// Why [`LaneExecutor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorExit {
    Shutdown,
    JobBudgetSpent,
}

/// Job executor that processes jobs from the lanes.
pub struct LaneExecutor {
    config: WorkerConfig,
    queue: Arc<dyn LaneQueue>,
    processor: Arc<JobProcessor>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl LaneExecutor {
    pub fn new(queue: Arc<dyn LaneQueue>, processor: Arc<JobProcessor>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: processor.config().clone(),
            queue,
            processor,
            shutdown,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Signal shutdown. The job in flight finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Serve the lanes until shutdown or until the job budget is spent.
    pub async fn run(&self) -> WorkerResult<ExecutorExit> {
        info!(
            consumer = %self.consumer_name,
            lanes = ?self.config.lanes,
            max_jobs = self.config.max_jobs,
            "Starting lane executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);
        let mut last_claim: Option<Instant> = None;
        let mut completed = 0usize;

        loop {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received, stopping executor");
                return Ok(ExecutorExit::Shutdown);
            }

            let claim_due = last_claim.map_or(true, |t| t.elapsed() >= self.config.claim_interval);
            if claim_due {
                last_claim = Some(Instant::now());
            }

            let next = if claim_due {
                match self.claim_stale().await {
                    Ok(Some(delivery)) => Ok(Some(delivery)),
                    Ok(None) => self.next_delivery().await,
                    Err(e) => Err(e),
                }
            } else {
                self.next_delivery().await
            };

            match next {
                Ok(Some(delivery)) => {
                    failures.record_success();
                    if self.handle(delivery).await.is_completed() {
                        completed += 1;
                    }
                    if self.config.max_jobs > 0 && completed >= self.config.max_jobs {
                        info!(completed, "Job budget spent, exiting for restart");
                        return Ok(ExecutorExit::JobBudgetSpent);
                    }
                }
                Ok(None) => {
                    failures.record_success();
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    if failures.record_failure() {
                        error!("Error consuming jobs: {}", e);
                    }
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval * 5) => {}
                    }
                }
            }
        }
    }

    /// Take and run at most one job. `None` when every lane is empty.
    pub async fn run_once(&self) -> WorkerResult<Option<JobDisposition>> {
        match self.next_delivery().await? {
            Some(delivery) => Ok(Some(self.handle(delivery).await)),
            None => Ok(None),
        }
    }

    /// Run deliveries abandoned by crashed consumers, at most one.
    pub async fn recover_once(&self) -> WorkerResult<Option<JobDisposition>> {
        match self.claim_stale().await? {
            Some(delivery) => Ok(Some(self.handle(delivery).await)),
            None => Ok(None),
        }
    }

    async fn next_delivery(&self) -> WorkerResult<Option<Delivery>> {
        for &lane in &self.config.lanes {
            if let Some(delivery) = self.queue.consume(lane, &self.consumer_name).await? {
                return Ok(Some(delivery));
            }
        }
        Ok(None)
    }

    async fn claim_stale(&self) -> WorkerResult<Option<Delivery>> {
        for &lane in &self.config.lanes {
            let mut claimed = self
                .queue
                .claim_stale(lane, &self.consumer_name, self.config.claim_min_idle, 1)
                .await?;
            if let Some(delivery) = claimed.pop() {
                info!(
                    lane = %lane,
                    job_id = %delivery.job.job_id(),
                    delivery_count = delivery.delivery_count,
                    "Claimed stale delivery"
                );
                return Ok(Some(delivery));
            }
        }
        Ok(None)
    }

    /// Execute a single delivery with ack-late and DLQ handling.
    async fn handle(&self, delivery: Delivery) -> JobDisposition {
        let lane = delivery.lane.as_str();
        let kind = delivery.job.kind();
        let job_id = delivery.job.job_id().to_string();

        if delivery.delivery_count > self.config.max_deliveries {
            let reason = format!("delivered {} times", delivery.delivery_count);
            return self.dead_letter(&delivery, &reason).await;
        }

        metrics::record_job_started(lane, kind);
        debug!(lane, job_id = %job_id, redelivery = delivery.is_redelivery(), "Executing {} job", kind);

        match self.processor.process(&delivery.job).await {
            Ok(()) => {
                metrics::record_job_completed(lane, kind);
                if let Err(e) = self.queue.ack(&delivery).await {
                    error!(job_id = %job_id, "Failed to ack job: {}", e);
                }
                if let Err(e) = self.queue.release(&delivery.job).await {
                    warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
                }
                JobDisposition::Acked
            }
            Err(e) if !e.is_retryable() || delivery.delivery_count >= self.config.max_deliveries => {
                metrics::record_job_failed(lane, kind);
                error!(job_id = %job_id, delivery_count = delivery.delivery_count, "Job failed for good: {}", e);
                self.dead_letter(&delivery, &e.to_string()).await
            }
            Err(e) => {
                metrics::record_job_failed(lane, kind);
                warn!(
                    job_id = %job_id,
                    attempt = delivery.delivery_count,
                    max = self.config.max_deliveries,
                    "Job will be redelivered: {}",
                    e
                );
                JobDisposition::Retrying(e.to_string())
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> JobDisposition {
        let job_id = delivery.job.job_id();
        warn!(job_id = %job_id, "Moving job to DLQ: {}", reason);
        metrics::record_dead_lettered(delivery.lane.as_str());

        if let Err(e) = self.processor.abandon(&delivery.job, reason).await {
            error!(job_id = %job_id, "Failed to record abandoned job: {}", e);
        }
        if let Err(e) = self.queue.dead_letter(delivery, reason).await {
            error!(job_id = %job_id, "Failed to move job to DLQ: {}", e);
        }
        if let Err(e) = self.queue.release(&delivery.job).await {
            warn!(job_id = %job_id, "Failed to clear dedup key: {}", e);
        }
        JobDisposition::DeadLettered(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_acked_jobs_count_toward_budget() {
        assert!(JobDisposition::Acked.is_completed());
        assert!(!JobDisposition::Retrying("redis down".into()).is_completed());
        assert!(!JobDisposition::DeadLettered("max deliveries".into()).is_completed());
    }
}
