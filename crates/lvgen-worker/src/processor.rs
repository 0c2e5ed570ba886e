//! Job processing.
//!
//! A generation job claims its unit in the task store, rebuilds the provider
//! input from the current task state (so prompt edits made while the job was
//! queued apply), runs the adapter with the transient-only retry policy,
//! caches the output and records the outcome. The update that records the
//! last segment outcome decides the group; when it reports
//! `ReadyToFinalize` this worker finalizes the task.

use std::sync::Arc;
use std::time::Instant;

use lvgen_media::{AssetSlot, MediaPostProcessor};
use lvgen_models::{InputParams, Task};
use lvgen_orchestrator::completion::{
    claim_unit, record_edit_charge, record_segment_outcome, record_single_outcome, Claim, FinalizeMode, Settlement, UnitOutcome,
};
use lvgen_orchestrator::credits::charge_edit_surcharge;
use lvgen_orchestrator::dispatcher::segment_input;
use lvgen_orchestrator::OrchestratorError;
use lvgen_providers::{ProviderError, ProviderRegistry};
use lvgen_queue::{CombineSegmentsJob, GenerationJob, QueueJob, WorkUnit};
use lvgen_storage::BlobStore;
use lvgen_store::{CreditLedger, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::cancel_watch::CancelWatch;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_transient, RetryPolicy};

/// Input key carrying the remote id of the generation to continue from.
const CONTINUATION_KEY: &str = "continuation_of";

/// Everything a job needs to run.
pub struct JobProcessor {
    pub(crate) config: WorkerConfig,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) ledger: Arc<dyn CreditLedger>,
    pub(crate) registry: ProviderRegistry,
    pub(crate) media: MediaPostProcessor,
    pub(crate) blobs: Option<BlobStore>,
}

impl JobProcessor {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn TaskStore>,
        ledger: Arc<dyn CreditLedger>,
        registry: ProviderRegistry,
        media: MediaPostProcessor,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            registry,
            media,
            blobs: None,
        }
    }

    /// Mirror combined videos to blob storage.
    pub fn with_blob_store(mut self, blobs: BlobStore) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one job to the end.
    ///
    /// `Ok` means the job may be acknowledged: its outcome was recorded or it
    /// had nothing left to do. `Err` leaves it for redelivery.
    pub async fn process(&self, job: &QueueJob) -> WorkerResult<()> {
        match job {
            QueueJob::Generate(j) => {
                let logger = JobLogger::new(&j.job_id, "generate", &j.task_id, j.unit.segment_index());
                self.generate(j, &logger).instrument(logger.span()).await
            }
            QueueJob::CombineSegments(j) => {
                let logger = JobLogger::new(&j.job_id, "combine_segments", &j.task_id, None);
                self.combine_job(j, &logger).instrument(logger.span()).await
            }
        }
    }

    /// Record a job that will not run again as a failed unit.
    pub async fn abandon(&self, job: &QueueJob, reason: &str) -> WorkerResult<()> {
        let QueueJob::Generate(j) = job else {
            return Ok(());
        };
        let outcome = UnitOutcome::Failed(format!("job abandoned: {reason}"));
        let result = match j.unit.segment_index() {
            Some(index) => record_segment_outcome(self.store.as_ref(), &j.task_id, index, outcome)
                .await
                .map(|(_, s)| s),
            None => record_single_outcome(self.store.as_ref(), &j.task_id, outcome)
                .await
                .map(|(_, s)| s),
        };
        match result {
            Ok(Settlement::ReadyToFinalize) if j.unit.segment_index().is_some() => {
                self.finalize(&j.task_id, FinalizeMode::Barrier).await?;
                Ok(())
            }
            Ok(_) | Err(OrchestratorError::TaskNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Generation
    // =========================================================================

    async fn generate(&self, job: &GenerationJob, logger: &JobLogger) -> WorkerResult<()> {
        let segment = job.unit.segment_index();

        let (task, claim) = match claim_unit(self.store.as_ref(), &job.task_id, segment).await {
            Ok(claimed) => claimed,
            Err(OrchestratorError::TaskNotFound(_)) => {
                logger.warning("task no longer exists, dropping job");
                return Ok(());
            }
            Err(e) if e.is_client_error() => return Err(WorkerError::unprocessable(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        match claim {
            Claim::Run => {}
            Claim::TaskTerminal(status) => {
                logger.progress(&format!("task is {}, skipping", status.as_str()));
                return Ok(());
            }
            Claim::AlreadyDone => {
                logger.progress("unit already settled, skipping");
                return Ok(());
            }
            Claim::NeedsFinalize => {
                logger.progress("unit settled before a crash, finishing finalization");
                self.finalize(&task.id, FinalizeMode::Barrier).await?;
                return Ok(());
            }
        }

        logger.started(&format!("{} on {}", job.service_name, job.provider));

        let outcome = self.run_unit(job, &task, logger).await?;
        self.record(job, outcome, logger).await
    }

    /// Produce the unit's outcome. `Err` only for infrastructure failures.
    async fn run_unit(&self, job: &GenerationJob, task: &Task, logger: &JobLogger) -> WorkerResult<UnitOutcome> {
        let Some(adapter) = self.registry.get(job.provider) else {
            return Ok(UnitOutcome::Failed(format!(
                "config: no adapter registered for provider {}",
                job.provider
            )));
        };

        let input = self.unit_input(job, task);

        if let WorkUnit::Segment { index, .. } = &job.unit {
            let due = task
                .long_video
                .as_ref()
                .and_then(|lv| lv.segment(*index))
                .is_some_and(|s| s.edit_surcharge_due(&job.job_id));
            if due {
                match charge_edit_surcharge(self.ledger.as_ref(), &task.owner_id, &task.id, &job.job_id, *index).await {
                    Ok(tx) => {
                        metrics::record_edit_surcharge("charged");
                        debug!(transaction = %tx.id, "Edit surcharge charged");
                        record_edit_charge(self.store.as_ref(), &task.id, *index, &job.job_id).await?;
                    }
                    Err(e) if e.is_insufficient() => {
                        metrics::record_edit_surcharge("insufficient");
                        return Ok(UnitOutcome::Failed(format!("edit surcharge not paid: {e}")));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let validated = match adapter.validate_input(&job.service_name, &input) {
            Ok(v) => v,
            Err(e) => return Ok(UnitOutcome::Failed(format!("{}: {}", e.class(), e))),
        };

        let cancel = CancellationToken::new();
        let _watch = CancelWatch::spawn(
            Arc::clone(&self.store),
            task.id.clone(),
            cancel.clone(),
            self.config.cancel_check_interval,
        );

        let policy = RetryPolicy::from_config(&self.config);
        let provider = job.provider.as_str();
        let started = Instant::now();
        let attempted = retry_transient(&policy, &cancel, provider, || adapter.generate(&validated, &cancel)).await;

        match attempted.result {
            Ok(asset) => {
                metrics::record_provider_latency(provider, started.elapsed());
                logger.progress(&format!("output ready after {} attempt(s): {}", attempted.attempts, asset.url));

                let slot = match job.unit.segment_index() {
                    Some(index) => AssetSlot::Segment(index),
                    None => AssetSlot::Primary,
                };
                let local_paths = self.media.fetch_and_store(&task.id, &asset, slot).await;
                if local_paths.is_empty() {
                    logger.warning("output not cached locally, keeping remote URL only");
                }
                Ok(UnitOutcome::Completed { asset, local_paths })
            }
            Err(ProviderError::ProviderCancelled) => Ok(UnitOutcome::Cancelled),
            Err(e) => {
                logger.failed(&format!("after {} attempt(s): {}", attempted.attempts, e));
                Ok(UnitOutcome::Failed(format!("{}: {}", e.class(), e)))
            }
        }
    }

    /// Provider input for the unit, derived from the task as it is now.
    fn unit_input(&self, job: &GenerationJob, task: &Task) -> InputParams {
        let WorkUnit::Segment {
            group_id,
            index,
            total,
            seed_from_previous,
        } = &job.unit
        else {
            return job.input.clone();
        };
        let Some(lv) = task.long_video.as_ref() else {
            return job.input.clone();
        };
        let Some(segment) = lv.segment(*index) else {
            return job.input.clone();
        };

        let mut input = segment_input(task, segment, *total, group_id);
        if *seed_from_previous && *index > 0 {
            let previous = lv
                .segment(index - 1)
                .and_then(|s| s.output.as_ref())
                .and_then(|o| o.metadata.remote_job_id.clone());
            match previous {
                Some(remote_id) => {
                    input.insert(CONTINUATION_KEY.into(), remote_id.into());
                }
                None => debug!(segment = index, "Previous segment not ready, generating without continuation"),
            }
        }
        input
    }

    async fn record(&self, job: &GenerationJob, outcome: UnitOutcome, logger: &JobLogger) -> WorkerResult<()> {
        let label = match &outcome {
            UnitOutcome::Completed { .. } => "completed",
            UnitOutcome::Failed(_) => "failed",
            UnitOutcome::Cancelled => "cancelled",
        };
        metrics::record_unit_settled(label);

        match job.unit.segment_index() {
            Some(index) => {
                let (_, settlement) = record_segment_outcome(self.store.as_ref(), &job.task_id, index, outcome).await?;
                match settlement {
                    Settlement::ReadyToFinalize => {
                        self.finalize(&job.task_id, FinalizeMode::Barrier).await?;
                    }
                    Settlement::Failed(ids) => {
                        logger.warning(&format!("group failed, unsuccessful segments {ids:?}"));
                    }
                    Settlement::Ignored => logger.progress("outcome ignored, task or segment already settled"),
                    Settlement::Open | Settlement::Deferred => {}
                }
            }
            None => {
                record_single_outcome(self.store.as_ref(), &job.task_id, outcome).await?;
            }
        }

        logger.finished(label);
        Ok(())
    }

    // =========================================================================
    // Combination
    // =========================================================================

    async fn combine_job(&self, job: &CombineSegmentsJob, logger: &JobLogger) -> WorkerResult<()> {
        logger.started("combining segments");
        match self.finalize(&job.task_id, FinalizeMode::Explicit).await {
            Ok(true) => {
                logger.finished("task updated");
                Ok(())
            }
            Ok(false) => {
                logger.warning("task not ready for combination, nothing changed");
                Ok(())
            }
            Err(WorkerError::Orchestrator(e)) if e.is_client_error() => {
                logger.warning(&format!("combination refused: {e}"));
                Ok(())
            }
            Err(WorkerError::Store(e)) if e.is_not_found() => {
                logger.warning("task no longer exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
