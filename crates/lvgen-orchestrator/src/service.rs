//! Orchestrator entry points.

use std::sync::Arc;

use lvgen_models::{
    GroupId, InputParams, JobId, MediaKind, SegmentGroupState, Service, Task, TaskId, TaskStatus,
};
use lvgen_queue::{CombineSegmentsJob, GenerationJob, LaneQueue, QueueJob};
use lvgen_store::{CreditLedger, ServiceCatalog, TaskStore, TaskStoreExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::completion::{settle, Settlement};
use crate::credits;
use crate::dispatcher::{build_jobs, segment_job, validate_jobs, SegmentDispatcher};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::metrics;
use crate::planner::{plan, plan_generic, SegmentsInput};
use crate::routing::{resolve, Route};

/// Long-video part of a submit request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongVideoRequest {
    /// Seconds; one of the preset durations unless `generic_duration`
    pub total_duration: u32,

    #[serde(flatten)]
    pub segments: SegmentsInput,

    /// Accept any multiple of the segment length within the generic bounds
    #[serde(default)]
    pub generic_duration: bool,
}

impl LongVideoRequest {
    pub fn new(total_duration: u32, segments: SegmentsInput) -> Self {
        Self {
            total_duration,
            segments,
            generic_duration: false,
        }
    }

    pub fn generic(mut self) -> Self {
        self.generic_duration = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub owner_id: String,
    pub provider: String,
    pub service_id: String,
    #[serde(default)]
    pub input: InputParams,
    #[serde(default)]
    pub long_video: Option<LongVideoRequest>,
}

impl SubmitRequest {
    pub fn new(
        owner_id: impl Into<String>,
        provider: impl Into<String>,
        service_id: impl Into<String>,
        input: InputParams,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            provider: provider.into(),
            service_id: service_id.into(),
            input,
            long_video: None,
        }
    }

    pub fn with_long_video(mut self, request: LongVideoRequest) -> Self {
        self.long_video = Some(request);
        self
    }
}

fn terminal(task: &Task) -> OrchestratorError {
    OrchestratorError::TaskTerminal {
        id: task.id.to_string(),
        status: task.status.as_str(),
    }
}

/// Public entry points of the orchestration core.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    dispatcher: SegmentDispatcher,
    ledger: Arc<dyn CreditLedger>,
    catalog: Arc<ServiceCatalog>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn LaneQueue>,
        ledger: Arc<dyn CreditLedger>,
        catalog: Arc<ServiceCatalog>,
    ) -> Self {
        Self {
            store,
            dispatcher: SegmentDispatcher::new(queue),
            ledger,
            catalog,
        }
    }

    fn service(&self, service_id: &str) -> OrchestratorResult<Service> {
        self.catalog
            .get(service_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::ServiceNotFound(service_id.to_string()))
    }

    fn route(&self, task: &Task, service: &Service) -> OrchestratorResult<Route> {
        resolve(&task.provider, &service.name)
            .ok_or_else(|| OrchestratorError::unroutable(&task.provider, &service.name))
    }

    // =========================================================================
    // Submit
    // =========================================================================

    /// Validate, persist, bill and dispatch a new task.
    ///
    /// Validation failures persist nothing. An unroutable provider/service
    /// pair leaves a FAILED task behind and enqueues nothing. A short balance
    /// leaves the task PENDING.
    pub async fn submit(&self, request: SubmitRequest) -> OrchestratorResult<TaskId> {
        let service = match self.service(&request.service_id) {
            Ok(service) => service,
            Err(e) => {
                metrics::record_submit(&request.provider, "service_not_found");
                return Err(e);
            }
        };

        let long_video = match &request.long_video {
            Some(lv) => {
                if service.kind != MediaKind::Video {
                    return Err(OrchestratorError::invalid_input(format!(
                        "service {} produces {}, long videos need a video service",
                        service.id,
                        service.kind.as_str()
                    )));
                }
                let config = if lv.generic_duration {
                    plan_generic(lv.total_duration, &lv.segments)?
                } else {
                    plan(lv.total_duration, &lv.segments)?
                };
                Some(config)
            }
            None => None,
        };

        let mut task = Task::new(
            &request.owner_id,
            service.kind,
            &request.provider,
            &service.id,
            request.input,
        );
        if let Some(config) = long_video {
            task = task.with_long_video(config);
        }

        let group_id = GroupId::new();
        let route = resolve(&task.provider, &service.name);
        let jobs = match &route {
            Some(route) => {
                let jobs = build_jobs(&task, &service, route, &group_id);
                validate_jobs(route, &jobs)?;
                Some(jobs)
            }
            None => None,
        };

        self.store.insert(&task).await?;
        info!(
            task_id = %task.id,
            owner_id = %task.owner_id,
            provider = %task.provider,
            service = %service.id,
            segments = task.long_video.as_ref().map(|lv| lv.num_segments()),
            "Task created"
        );

        let (Some(route), Some(jobs)) = (route, jobs) else {
            let err = OrchestratorError::unroutable(&task.provider, &service.name);
            let message = err.to_string();
            self.store
                .update_with(&task.id, |t: &mut Task| -> OrchestratorResult<()> {
                    t.fail(message.clone())?;
                    Ok(())
                })
                .await?;
            warn!(task_id = %task.id, "{}", message);
            metrics::record_submit(&task.provider, "unroutable");
            return Err(err);
        };

        let cost = credits::task_cost(&task, &service);
        if cost > 0 {
            if let Err(e) = credits::debit_dispatch(self.ledger.as_ref(), &task, cost).await {
                let err = OrchestratorError::from(e);
                let message = err.to_string();
                self.store
                    .update_with(&task.id, |t: &mut Task| -> OrchestratorResult<()> {
                        t.error_message = Some(message.clone());
                        Ok(())
                    })
                    .await?;
                warn!(task_id = %task.id, cost, "Dispatch not paid: {}", message);
                metrics::record_submit(&task.provider, "not_paid");
                return Err(err);
            }
        }

        let stamped_group = group_id.clone();
        self.store
            .update_with(&task.id, move |t: &mut Task| -> OrchestratorResult<()> {
                t.mark_processing()?;
                if let Some(lv) = t.long_video.as_mut() {
                    lv.group_id = Some(stamped_group.clone());
                }
                Ok(())
            })
            .await?;

        let job_count = jobs.len();
        if let Err(e) = self.dispatcher.enqueue_all(jobs).await {
            let message = format!("Failed to enqueue jobs: {e}");
            self.store
                .update_with(&task.id, |t: &mut Task| -> OrchestratorResult<()> {
                    t.fail(message.clone())?;
                    Ok(())
                })
                .await?;
            if cost > 0 {
                if let Err(refund) = credits::refund_dispatch(self.ledger.as_ref(), &task, cost).await {
                    warn!(task_id = %task.id, cost, "Refund after failed dispatch did not go through: {}", refund);
                }
            }
            metrics::record_submit(&task.provider, "enqueue_failed");
            return Err(e.into());
        }

        metrics::record_dispatched(route.lane.as_str(), job_count);
        metrics::record_submit(&task.provider, "dispatched");
        info!(
            task_id = %task.id,
            lane = %route.lane,
            jobs = job_count,
            group_id = %group_id,
            cost,
            "Task dispatched"
        );
        Ok(task.id)
    }

    // =========================================================================
    // Pause / resume
    // =========================================================================

    /// Mark `segment_index` as the pause point. Queued jobs keep running and
    /// the task status does not change.
    pub async fn pause(&self, task_id: &TaskId, segment_index: u32) -> OrchestratorResult<Task> {
        metrics::record_control("pause");
        let (task, ()) = self
            .store
            .update_with(task_id, |t: &mut Task| -> OrchestratorResult<()> {
                if t.status.is_terminal() {
                    return Err(terminal(t));
                }
                let id = t.id.to_string();
                let lv = t
                    .long_video
                    .as_mut()
                    .ok_or(OrchestratorError::NotALongVideoTask(id))?;
                let count = lv.num_segments();
                if segment_index >= count {
                    return Err(OrchestratorError::SegmentOutOfRange {
                        index: segment_index,
                        count,
                    });
                }
                lv.paused_at_segment = Some(segment_index);
                Ok(())
            })
            .await?;

        info!(task_id = %task_id, segment = segment_index, "Task paused");
        Ok(task)
    }

    /// Clear the pause marker, optionally rewriting the paused segment's
    /// prompt. Never enqueues generation work.
    ///
    /// When the group already settled during the pause and no prompt was
    /// changed, the deferred finalization is queued.
    ///
    /// An edit never settles the group, even when it already settled
    /// unsuccessfully during the pause: the task stays PROCESSING until the
    /// caller re-enters with [`Self::redispatch_segment`] or cancels.
    pub async fn resume(&self, task_id: &TaskId, new_prompt: Option<String>) -> OrchestratorResult<Task> {
        metrics::record_control("resume");
        let (task, settlement) = self
            .store
            .update_with(task_id, |t: &mut Task| -> OrchestratorResult<Settlement> {
                if t.status.is_terminal() {
                    return Err(terminal(t));
                }
                let id = t.id.to_string();
                let lv = t
                    .long_video
                    .as_mut()
                    .ok_or_else(|| OrchestratorError::NotALongVideoTask(id.clone()))?;
                let index = lv
                    .paused_at_segment
                    .ok_or(OrchestratorError::NoPauseInProgress(id.clone()))?;

                if let Some(prompt) = &new_prompt {
                    if !lv.allow_scene_editing {
                        return Err(OrchestratorError::SceneEditingDisabled(id));
                    }
                    if prompt.trim().is_empty() {
                        return Err(OrchestratorError::invalid_input("prompt must not be blank"));
                    }
                    let count = lv.num_segments();
                    let segment = lv
                        .segment_mut(index)
                        .ok_or(OrchestratorError::SegmentOutOfRange { index, count })?;
                    segment.edit_prompt(prompt.clone());
                }
                lv.paused_at_segment = None;

                Ok(if new_prompt.is_some() {
                    Settlement::Open
                } else {
                    settle(t)
                })
            })
            .await?;

        info!(task_id = %task_id, edited = new_prompt.is_some(), "Task resumed");

        if settlement == Settlement::ReadyToFinalize {
            let job = CombineSegmentsJob::new(task.id.clone(), &task.owner_id);
            self.dispatcher
                .enqueue(QueueJob::CombineSegments(job))
                .await?;
            info!(task_id = %task_id, "Queued deferred finalization");
        }
        Ok(task)
    }

    // =========================================================================
    // Redispatch / cancel / combine
    // =========================================================================

    /// Regenerate one settled segment with its current prompt.
    pub async fn redispatch_segment(&self, task_id: &TaskId, segment_index: u32) -> OrchestratorResult<JobId> {
        metrics::record_control("redispatch");
        let current = self.get_status(task_id).await?;
        let service = self.service(&current.service_id)?;
        let route = self.route(&current, &service)?;

        let (task, job) = self
            .store
            .update_with(task_id, |t: &mut Task| -> OrchestratorResult<GenerationJob> {
                match t.status {
                    TaskStatus::Pending => return Err(OrchestratorError::NotDispatched(t.id.to_string())),
                    s if s.is_terminal() => return Err(terminal(t)),
                    _ => {}
                }
                let id = t.id.to_string();
                let lv = t
                    .long_video
                    .as_mut()
                    .ok_or(OrchestratorError::NotALongVideoTask(id))?;
                let count = lv.num_segments();
                if lv.paused_at_segment.is_some_and(|p| p <= segment_index) {
                    return Err(OrchestratorError::SegmentPaused(segment_index));
                }
                let segment = lv.segment_mut(segment_index).ok_or(OrchestratorError::SegmentOutOfRange {
                    index: segment_index,
                    count,
                })?;
                if !segment.is_terminal() {
                    return Err(OrchestratorError::SegmentInFlight(segment_index));
                }
                segment.reset();
                lv.advance_current_index();
                let group_id = lv.group_id.get_or_insert_with(GroupId::new).clone();

                let job = segment_job(t, &service, &route, &group_id, segment_index).ok_or(
                    OrchestratorError::SegmentOutOfRange {
                        index: segment_index,
                        count,
                    },
                )?;
                validate_jobs(&route, std::slice::from_ref(&job))?;
                Ok(job)
            })
            .await?;

        let job_id = job.job_id.clone();
        if let Err(e) = self.dispatcher.enqueue_all(vec![job]).await {
            let message = format!("Redispatch failed to enqueue: {e}");
            self.store
                .update_with(task_id, |t: &mut Task| -> OrchestratorResult<()> {
                    if let Some(segment) = t.long_video.as_mut().and_then(|lv| lv.segment_mut(segment_index)) {
                        if segment.status == TaskStatus::Pending {
                            segment.status = TaskStatus::Failed;
                            segment.error_message = Some(message.clone());
                        }
                    }
                    Ok(())
                })
                .await?;
            return Err(e.into());
        }

        metrics::record_dispatched(route.lane.as_str(), 1);
        info!(
            task_id = %task.id,
            segment = segment_index,
            job_id = %job_id,
            lane = %route.lane,
            "Segment redispatched"
        );
        Ok(job_id)
    }

    /// Cancel the task and every open segment. Workers notice the flip and
    /// ask the provider to cancel the remote job.
    pub async fn cancel(&self, task_id: &TaskId) -> OrchestratorResult<Task> {
        metrics::record_control("cancel");
        let (task, ()) = self
            .store
            .update_with(task_id, |t: &mut Task| -> OrchestratorResult<()> {
                if t.status.is_terminal() {
                    return Err(terminal(t));
                }
                t.cancel()?;
                Ok(())
            })
            .await?;

        info!(task_id = %task_id, "Task cancelled");
        Ok(task)
    }

    /// Queue a combination of the completed segments into one video.
    pub async fn combine(&self, task_id: &TaskId) -> OrchestratorResult<JobId> {
        metrics::record_control("combine");
        let task = self.get_status(task_id).await?;
        let lv = task
            .long_video
            .as_ref()
            .ok_or_else(|| OrchestratorError::NotALongVideoTask(task.id.to_string()))?;

        match task.status {
            TaskStatus::Pending => return Err(OrchestratorError::NotDispatched(task.id.to_string())),
            TaskStatus::Failed | TaskStatus::Cancelled => return Err(terminal(&task)),
            TaskStatus::Processing | TaskStatus::Completed => {}
        }
        if lv.state() != SegmentGroupState::AllCompleted {
            return Err(OrchestratorError::SegmentsIncomplete);
        }
        if let Some(paused) = lv.paused_at_segment {
            return Err(OrchestratorError::SegmentPaused(paused));
        }

        let job = CombineSegmentsJob::new(task.id.clone(), &task.owner_id);
        let job_id = self.dispatcher.enqueue(QueueJob::CombineSegments(job)).await?;
        info!(task_id = %task_id, job_id = %job_id, "Combination queued");
        Ok(job_id)
    }

    pub async fn get_status(&self, task_id: &TaskId) -> OrchestratorResult<Task> {
        Ok(self.store.require(task_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvgen_models::{Lane, LocalPaths, OutputAsset};
    use lvgen_queue::InMemoryLaneQueue;
    use lvgen_store::{InMemoryLedger, InMemoryTaskStore};

    use crate::completion::{record_segment_outcome, UnitOutcome};

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<InMemoryTaskStore>,
        queue: Arc<InMemoryLaneQueue>,
        ledger: Arc<InMemoryLedger>,
    }

    fn harness(balance: u32) -> Harness {
        let store = Arc::new(InMemoryTaskStore::new());
        let queue = Arc::new(InMemoryLaneQueue::new());
        let ledger = Arc::new(InMemoryLedger::new().with_balance("u1", balance));
        let orchestrator = Orchestrator::new(
            store.clone(),
            queue.clone(),
            ledger.clone(),
            Arc::new(ServiceCatalog::builtin()),
        );
        Harness {
            orchestrator,
            store,
            queue,
            ledger,
        }
    }

    fn input(prompt: &str) -> InputParams {
        let mut input = InputParams::new();
        input.insert("prompt".into(), prompt.into());
        input
    }

    fn long_request(duration: u32) -> SubmitRequest {
        SubmitRequest::new("u1", "luma", "luma-ray-2", input("a river"))
            .with_long_video(LongVideoRequest::new(duration, SegmentsInput::new(["a river"])))
    }

    #[tokio::test]
    async fn test_submit_long_video() {
        let h = harness(100);
        let id = h.orchestrator.submit(long_request(40)).await;
        assert!(matches!(id, Err(OrchestratorError::InvalidInput(_))));

        let id = h.orchestrator.submit(long_request(32)).await.unwrap();
        let task = h.orchestrator.get_status(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert!(task.long_video.as_ref().unwrap().group_id.is_some());
        assert_eq!(h.queue.ready_jobs(Lane::Luma).len(), 4);
        assert_eq!(h.ledger.balance("u1").await.unwrap(), 96);
    }

    #[tokio::test]
    async fn test_invalid_duration_persists_nothing() {
        let h = harness(100);
        let err = h.orchestrator.submit(long_request(50)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidInput(_)));
        assert!(h.store.is_empty().await);
        assert!(h.ledger.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let h = harness(100);
        let request = SubmitRequest::new("u1", "luma", "nope", input("x"));
        assert!(matches!(
            h.orchestrator.submit(request).await,
            Err(OrchestratorError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unroutable_pair_fails_task_without_jobs() {
        let h = harness(100);
        let request = SubmitRequest::new("u1", "runway", "luma-ray-2", input("x"))
            .with_long_video(LongVideoRequest::new(32, SegmentsInput::new(["x"])));
        let err = h.orchestrator.submit(request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Unroutable { .. }));

        let stored = h.store.tasks().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TaskStatus::Failed);
        let message = stored[0].error_message.as_deref().unwrap();
        assert!(message.contains("'runway'"));
        assert!(message.contains("'ray-2'"));
        for lane in Lane::ALL {
            assert_eq!(h.queue.len(lane).await.unwrap(), 0);
        }
        assert!(h.ledger.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_credits_keeps_task_pending() {
        let h = harness(3);
        let err = h.orchestrator.submit(long_request(32)).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InsufficientCredits {
                needed: 4,
                available: 3
            }
        ));
        assert_eq!(h.ledger.balance("u1").await.unwrap(), 3);
        assert_eq!(h.queue.ready_jobs(Lane::Luma).len(), 0);

        let stored = h.store.tasks().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TaskStatus::Pending);
        assert!(stored[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let h = harness(100);
        let request = SubmitRequest::new("u1", "luma", "luma-ray-2", input("a river"))
            .with_long_video(LongVideoRequest::new(40, SegmentsInput::new(["a river"])).generic());
        let id = h.orchestrator.submit(request).await.unwrap();

        let task = h.orchestrator.pause(&id, 2).await.unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        let lv = task.long_video.as_ref().unwrap();
        assert_eq!(lv.paused_at_segment, Some(2));
        assert!(lv.segments.iter().all(|s| s.status == TaskStatus::Pending));

        let task = h
            .orchestrator
            .resume(&id, Some("new prompt".into()))
            .await
            .unwrap();
        let lv = task.long_video.as_ref().unwrap();
        assert_eq!(lv.segments[2].prompt, "new prompt");
        assert!(lv.segments[2].edited);
        assert_eq!(lv.paused_at_segment, None);

        assert!(matches!(
            h.orchestrator.resume(&id, None).await,
            Err(OrchestratorError::NoPauseInProgress(_))
        ));
        assert_eq!(h.queue.ready_jobs(Lane::Luma).len(), 5);
    }

    #[tokio::test]
    async fn test_pause_errors() {
        let h = harness(100);
        assert!(matches!(
            h.orchestrator.pause(&TaskId::new(), 0).await,
            Err(OrchestratorError::TaskNotFound(_))
        ));

        let single = SubmitRequest::new("u1", "replicate", "replicate-flux-schnell", input("a fox"));
        let id = h.orchestrator.submit(single).await.unwrap();
        assert!(matches!(
            h.orchestrator.pause(&id, 0).await,
            Err(OrchestratorError::NotALongVideoTask(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_respects_scene_editing() {
        let h = harness(100);
        let request = SubmitRequest::new("u1", "luma", "luma-ray-2", input("x")).with_long_video(
            LongVideoRequest::new(32, SegmentsInput::new(["x"]).with_scene_editing(false)),
        );
        let id = h.orchestrator.submit(request).await.unwrap();
        h.orchestrator.pause(&id, 1).await.unwrap();

        assert!(matches!(
            h.orchestrator.resume(&id, Some("y".into())).await,
            Err(OrchestratorError::SceneEditingDisabled(_))
        ));
        let task = h.orchestrator.resume(&id, None).await.unwrap();
        assert_eq!(task.long_video.unwrap().paused_at_segment, None);
    }

    #[tokio::test]
    async fn test_redispatch_rules() {
        let h = harness(100);
        let id = h.orchestrator.submit(long_request(32)).await.unwrap();

        assert!(matches!(
            h.orchestrator.redispatch_segment(&id, 1).await,
            Err(OrchestratorError::SegmentInFlight(1))
        ));

        record_segment_outcome(
            h.store.as_ref(),
            &id,
            1,
            UnitOutcome::Failed("provider_failed".into()),
        )
        .await
        .unwrap();

        h.orchestrator.pause(&id, 1).await.unwrap();
        assert!(matches!(
            h.orchestrator.redispatch_segment(&id, 1).await,
            Err(OrchestratorError::SegmentPaused(1))
        ));
        h.orchestrator.resume(&id, Some("better".into())).await.unwrap();

        h.orchestrator.redispatch_segment(&id, 1).await.unwrap();
        let task = h.orchestrator.get_status(&id).await.unwrap();
        let segment = &task.long_video.as_ref().unwrap().segments[1];
        assert_eq!(segment.status, TaskStatus::Pending);
        assert!(segment.error_message.is_none());
        assert_eq!(h.queue.ready_jobs(Lane::Luma).len(), 5);

        let jobs = h.queue.ready_jobs(Lane::Luma);
        let QueueJob::Generate(last) = jobs.last().unwrap() else {
            panic!("expected a generation job");
        };
        assert_eq!(last.unit.segment_index(), Some(1));
        assert!(last.input["prompt"].as_str().unwrap().ends_with("better"));
    }

    #[tokio::test]
    async fn test_edit_after_failed_group_waits_for_redispatch() {
        let h = harness(100);
        let id = h.orchestrator.submit(long_request(32)).await.unwrap();

        h.orchestrator.pause(&id, 1).await.unwrap();
        for i in 0..4 {
            let outcome = if i == 1 {
                UnitOutcome::Failed("provider_failed".into())
            } else {
                UnitOutcome::Completed {
                    asset: OutputAsset::new(format!("https://cdn/{i}.mp4"), MediaKind::Video),
                    local_paths: LocalPaths::default(),
                }
            };
            record_segment_outcome(h.store.as_ref(), &id, i, outcome).await.unwrap();
        }

        let task = h.orchestrator.resume(&id, Some("better".into())).await.unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(h.queue.ready_jobs(Lane::Default).len(), 0);

        h.orchestrator.redispatch_segment(&id, 1).await.unwrap();
        let task = h.orchestrator.get_status(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.long_video.unwrap().segments[1].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel() {
        let h = harness(100);
        let id = h.orchestrator.submit(long_request(32)).await.unwrap();

        let task = h.orchestrator.cancel(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task
            .long_video
            .unwrap()
            .segments
            .iter()
            .all(|s| s.status == TaskStatus::Cancelled));

        assert!(matches!(
            h.orchestrator.cancel(&id).await,
            Err(OrchestratorError::TaskTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_combine_requires_completed_segments() {
        let h = harness(100);
        let id = h.orchestrator.submit(long_request(32)).await.unwrap();
        assert!(matches!(
            h.orchestrator.combine(&id).await,
            Err(OrchestratorError::SegmentsIncomplete)
        ));

        h.orchestrator.pause(&id, 3).await.unwrap();
        for i in 0..4 {
            record_segment_outcome(
                h.store.as_ref(),
                &id,
                i,
                UnitOutcome::Completed {
                    asset: OutputAsset::new(format!("https://cdn/{i}.mp4"), MediaKind::Video),
                    local_paths: LocalPaths::default(),
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(
            h.orchestrator.get_status(&id).await.unwrap().status,
            TaskStatus::Processing
        );

        // Resuming without an edit queues the finalization the pause held back.
        h.orchestrator.resume(&id, None).await.unwrap();
        assert_eq!(h.queue.ready_jobs(Lane::Default).len(), 1);
    }
}
