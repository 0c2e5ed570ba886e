//! Recording unit outcomes and aggregating segment groups.
//!
//! Segment outcomes are written in the same atomic store update that looks
//! at the rest of the group. Only the update that moves the last open
//! segment to a terminal state (with no pause in effect) sees
//! [`Settlement::ReadyToFinalize`] or fails the parent, so the group settles
//! exactly once however the segments interleave.

use lvgen_models::{JobId, LocalPaths, OutputAsset, SegmentGroupState, SegmentStatus, Task, TaskId, TaskStatus};
use lvgen_store::{TaskStore, TaskStoreExt};
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Result of one unit of work.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Completed {
        asset: OutputAsset,
        local_paths: LocalPaths,
    },
    Failed(String),
    Cancelled,
}

/// What the group looks like after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Other segments are still open
    Open,
    /// Every segment is terminal but a pause holds finalization back
    Deferred,
    /// Every segment completed; the caller must finalize
    ReadyToFinalize,
    /// The group settled with these segments unsuccessful; the task was failed
    Failed(Vec<u32>),
    /// The task was already terminal or the outcome was a replay
    Ignored,
}

/// Whether a worker should run a unit it just received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// Unit marked processing; run it
    Run,
    /// Task already terminal
    TaskTerminal(TaskStatus),
    /// Segment already reached a terminal state on an earlier delivery
    AlreadyDone,
    /// Segment already done and the group is waiting for finalization
    NeedsFinalize,
}

/// How finalization treats a task that already completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Triggered by the barrier; a completed task is left alone
    Barrier,
    /// Caller asked for a combination; refresh the combined asset
    Explicit,
}

/// Evaluate the group of a processing task and fail it when it settled
/// unsuccessfully.
pub fn settle(task: &mut Task) -> Settlement {
    if task.status != TaskStatus::Processing {
        return Settlement::Ignored;
    }
    let Some(lv) = task.long_video.as_ref() else {
        return Settlement::Ignored;
    };

    match lv.state() {
        SegmentGroupState::Open => Settlement::Open,
        _ if lv.paused_at_segment.is_some() => Settlement::Deferred,
        SegmentGroupState::AllCompleted => Settlement::ReadyToFinalize,
        SegmentGroupState::Unsuccessful(ids) => {
            let details: Vec<String> = lv
                .segments
                .iter()
                .filter(|s| ids.contains(&s.segment_id))
                .map(|s| match &s.error_message {
                    Some(msg) => format!("#{} {}: {}", s.segment_id, s.status.as_str(), msg),
                    None => format!("#{} {}", s.segment_id, s.status.as_str()),
                })
                .collect();
            let message = format!(
                "{} of {} segments did not complete ({})",
                ids.len(),
                lv.num_segments(),
                details.join("; ")
            );
            match task.fail(message) {
                Ok(()) => Settlement::Failed(ids),
                Err(_) => Settlement::Ignored,
            }
        }
    }
}

/// Mark a unit as processing unless it no longer needs to run.
pub async fn claim_unit(
    store: &dyn TaskStore,
    task_id: &TaskId,
    segment: Option<u32>,
) -> OrchestratorResult<(Task, Claim)> {
    store
        .update_with(task_id, |task: &mut Task| -> OrchestratorResult<Claim> {
            if task.status.is_terminal() {
                return Ok(Claim::TaskTerminal(task.status));
            }
            let Some(index) = segment else {
                return Ok(Claim::Run);
            };

            let lv = task
                .long_video
                .as_mut()
                .ok_or_else(|| OrchestratorError::NotALongVideoTask(task.id.to_string()))?;
            let count = lv.num_segments();
            let seg = lv
                .segment_mut(index)
                .ok_or(OrchestratorError::SegmentOutOfRange { index, count })?;

            if seg.is_terminal() {
                let waiting = task.status == TaskStatus::Processing
                    && lv.paused_at_segment.is_none()
                    && lv.state() == SegmentGroupState::AllCompleted;
                return Ok(if waiting {
                    Claim::NeedsFinalize
                } else {
                    Claim::AlreadyDone
                });
            }

            seg.status = SegmentStatus::Processing;
            seg.error_message = None;
            Ok(Claim::Run)
        })
        .await
}

/// Record the outcome of a single-shot task.
pub async fn record_single_outcome(
    store: &dyn TaskStore,
    task_id: &TaskId,
    outcome: UnitOutcome,
) -> OrchestratorResult<(Task, Settlement)> {
    store
        .update_with(task_id, move |task: &mut Task| -> OrchestratorResult<Settlement> {
            if task.status.is_terminal() {
                return Ok(Settlement::Ignored);
            }
            let applied = match outcome.clone() {
                UnitOutcome::Completed { asset, local_paths } => {
                    task.local_paths = local_paths;
                    task.complete(vec![asset])
                }
                UnitOutcome::Failed(message) => task.fail(message),
                UnitOutcome::Cancelled => task.cancel(),
            };
            Ok(match applied {
                Ok(()) => Settlement::ReadyToFinalize,
                Err(e) => {
                    debug!(task_id = %task.id, "Single outcome not applied: {}", e);
                    Settlement::Ignored
                }
            })
        })
        .await
}

/// Record one segment's outcome and evaluate the group in the same update.
pub async fn record_segment_outcome(
    store: &dyn TaskStore,
    task_id: &TaskId,
    index: u32,
    outcome: UnitOutcome,
) -> OrchestratorResult<(Task, Settlement)> {
    let (task, settlement) = store
        .update_with(task_id, move |task: &mut Task| -> OrchestratorResult<Settlement> {
            // Segments of a cancelled or failed task keep what they had.
            if task.status.is_terminal() {
                return Ok(Settlement::Ignored);
            }

            let lv = task
                .long_video
                .as_mut()
                .ok_or_else(|| OrchestratorError::NotALongVideoTask(task.id.to_string()))?;
            let count = lv.num_segments();
            let segment = lv
                .segment_mut(index)
                .ok_or(OrchestratorError::SegmentOutOfRange { index, count })?;

            if segment.is_terminal() {
                return Ok(Settlement::Ignored);
            }

            match outcome.clone() {
                UnitOutcome::Completed { asset, .. } => {
                    segment.status = SegmentStatus::Completed;
                    segment.output = Some(asset);
                    segment.error_message = None;
                }
                UnitOutcome::Failed(message) => {
                    segment.status = SegmentStatus::Failed;
                    segment.error_message = Some(message);
                }
                UnitOutcome::Cancelled => {
                    segment.status = SegmentStatus::Cancelled;
                }
            }
            lv.advance_current_index();

            Ok(settle(task))
        })
        .await?;

    match &settlement {
        Settlement::ReadyToFinalize => {
            info!(task_id = %task_id, segment = index, "Last segment settled, group ready");
        }
        Settlement::Failed(ids) => {
            warn!(task_id = %task_id, failed = ?ids, "Segment group failed");
        }
        Settlement::Deferred => {
            info!(task_id = %task_id, segment = index, "Group settled while paused");
        }
        _ => {}
    }
    Ok((task, settlement))
}

/// Complete a long-video task whose segments all completed.
///
/// Outputs are the segment outputs in segment order, followed by the
/// combined video when there is one. Returns whether the task changed.
pub async fn finalize_group(
    store: &dyn TaskStore,
    task_id: &TaskId,
    combined: Option<(OutputAsset, LocalPaths)>,
    mode: FinalizeMode,
) -> OrchestratorResult<(Task, bool)> {
    store
        .update_with(task_id, move |task: &mut Task| -> OrchestratorResult<bool> {
            let Some(lv) = task.long_video.as_ref() else {
                return Err(OrchestratorError::NotALongVideoTask(task.id.to_string()));
            };

            let ready = lv.state() == SegmentGroupState::AllCompleted;
            let mut outputs: Vec<OutputAsset> =
                lv.ordered_outputs().into_iter().map(|(_, o)| o.clone()).collect();

            match task.status {
                TaskStatus::Processing if ready && lv.paused_at_segment.is_none() => {
                    if let Some((asset, paths)) = combined.clone() {
                        outputs.push(asset);
                        task.local_paths = paths;
                    }
                    task.complete(outputs)
                        .map_err(|e| OrchestratorError::invalid_input(e.to_string()))?;
                    Ok(true)
                }
                TaskStatus::Completed if mode == FinalizeMode::Explicit => {
                    let Some((asset, paths)) = combined.clone() else {
                        return Ok(false);
                    };
                    outputs.push(asset);
                    task.outputs = outputs;
                    task.local_paths = paths;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
        .await
}

/// Note that `job_id` paid the surcharge for the segment's current edit.
///
/// A no-op when the prompt was edited again in the meantime; that edit is
/// owed by whichever job runs it.
pub async fn record_edit_charge(
    store: &dyn TaskStore,
    task_id: &TaskId,
    index: u32,
    job_id: &JobId,
) -> OrchestratorResult<Task> {
    let (task, ()) = store
        .update_with(task_id, |task: &mut Task| -> OrchestratorResult<()> {
            let seg = task.long_video.as_mut().and_then(|lv| lv.segment_mut(index));
            if let Some(seg) = seg {
                if seg.edit_surcharge_due(job_id) {
                    seg.edit_charged_by = Some(job_id.clone());
                }
            }
            Ok(())
        })
        .await?;
    Ok(task)
}

/// Fail a processing long-video task whose group settled unsuccessfully
/// without a barrier update noticing (e.g. after a pause was lifted).
pub async fn settle_group(store: &dyn TaskStore, task_id: &TaskId) -> OrchestratorResult<(Task, Settlement)> {
    store
        .update_with(task_id, |task: &mut Task| -> OrchestratorResult<Settlement> { Ok(settle(task)) })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{plan, SegmentsInput};
    use lvgen_models::MediaKind;
    use lvgen_store::InMemoryTaskStore;
    use std::sync::Arc;

    async fn processing_task(store: &InMemoryTaskStore) -> TaskId {
        let config = plan(32, &SegmentsInput::new(["p"])).unwrap();
        let mut task = Task::new("u1", MediaKind::Video, "luma", "luma-ray-2", Default::default())
            .with_long_video(config);
        task.mark_processing().unwrap();
        store.insert(&task).await.unwrap();
        task.id
    }

    fn done(i: u32) -> UnitOutcome {
        UnitOutcome::Completed {
            asset: OutputAsset::new(format!("https://cdn/{i}.mp4"), MediaKind::Video),
            local_paths: LocalPaths::default(),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_completion_settles_once() {
        let store = InMemoryTaskStore::new();
        let id = processing_task(&store).await;

        let mut settlements = Vec::new();
        for i in [2, 0, 3, 1] {
            let (_, s) = record_segment_outcome(&store, &id, i, done(i)).await.unwrap();
            settlements.push(s);
        }
        assert_eq!(
            settlements,
            vec![
                Settlement::Open,
                Settlement::Open,
                Settlement::Open,
                Settlement::ReadyToFinalize
            ]
        );

        // A replayed outcome does not settle the group again.
        let (_, replay) = record_segment_outcome(&store, &id, 1, done(1)).await.unwrap();
        assert_eq!(replay, Settlement::Ignored);

        let (task, changed) = finalize_group(&store, &id, None, FinalizeMode::Barrier)
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(task.status, TaskStatus::Completed);
        let urls: Vec<&str> = task.outputs.iter().map(|o| o.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn/0.mp4",
                "https://cdn/1.mp4",
                "https://cdn/2.mp4",
                "https://cdn/3.mp4"
            ]
        );

        let (_, again) = finalize_group(&store, &id, None, FinalizeMode::Barrier)
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_settle_exactly_once() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = processing_task(&store).await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                record_segment_outcome(store.as_ref(), &id, i, done(i))
                    .await
                    .unwrap()
                    .1
            }));
        }
        let mut ready = 0;
        for handle in handles {
            if handle.await.unwrap() == Settlement::ReadyToFinalize {
                ready += 1;
            }
        }
        assert_eq!(ready, 1);
    }

    #[tokio::test]
    async fn test_failed_segment_fails_task_when_group_settles() {
        let store = InMemoryTaskStore::new();
        let id = processing_task(&store).await;

        record_segment_outcome(&store, &id, 0, done(0)).await.unwrap();
        let (task, s) = record_segment_outcome(&store, &id, 1, UnitOutcome::Failed("provider_failed: nsfw".into()))
            .await
            .unwrap();
        assert_eq!(s, Settlement::Open);
        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.long_video.as_ref().unwrap().current_segment_index, 1);

        record_segment_outcome(&store, &id, 2, done(2)).await.unwrap();
        let (task, s) = record_segment_outcome(&store, &id, 3, done(3)).await.unwrap();
        assert_eq!(s, Settlement::Failed(vec![1]));
        assert_eq!(task.status, TaskStatus::Failed);
        let message = task.error_message.unwrap();
        assert!(message.contains("#1 failed: provider_failed: nsfw"));
    }

    #[tokio::test]
    async fn test_pause_defers_settlement() {
        let store = InMemoryTaskStore::new();
        let id = processing_task(&store).await;
        store
            .update(&id, &|t: &mut Task| {
                if let Some(lv) = t.long_video.as_mut() {
                    lv.paused_at_segment = Some(1);
                }
                Ok(())
            })
            .await
            .unwrap();

        for i in 0..3 {
            record_segment_outcome(&store, &id, i, done(i)).await.unwrap();
        }
        let (task, s) = record_segment_outcome(&store, &id, 3, done(3)).await.unwrap();
        assert_eq!(s, Settlement::Deferred);
        assert_eq!(task.status, TaskStatus::Processing);

        let (_, changed) = finalize_group(&store, &id, None, FinalizeMode::Barrier)
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_outcomes_after_cancel_are_ignored() {
        let store = InMemoryTaskStore::new();
        let id = processing_task(&store).await;
        record_segment_outcome(&store, &id, 0, done(0)).await.unwrap();
        store
            .update(&id, &|t: &mut Task| {
                t.cancel().map_err(|e| lvgen_store::StoreError::internal(e.to_string()))
            })
            .await
            .unwrap();

        let (task, s) = record_segment_outcome(&store, &id, 1, done(1)).await.unwrap();
        assert_eq!(s, Settlement::Ignored);
        let lv = task.long_video.unwrap();
        assert_eq!(lv.segments[0].status, SegmentStatus::Completed);
        assert!(lv.segments[0].output.is_some());
        assert_eq!(lv.segments[1].status, SegmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_claim_unit() {
        let store = InMemoryTaskStore::new();
        let id = processing_task(&store).await;

        let (task, claim) = claim_unit(&store, &id, Some(0)).await.unwrap();
        assert_eq!(claim, Claim::Run);
        assert_eq!(task.long_video.unwrap().segments[0].status, SegmentStatus::Processing);

        record_segment_outcome(&store, &id, 0, done(0)).await.unwrap();
        let (_, claim) = claim_unit(&store, &id, Some(0)).await.unwrap();
        assert_eq!(claim, Claim::AlreadyDone);

        for i in 1..4 {
            record_segment_outcome(&store, &id, i, done(i)).await.unwrap();
        }
        let (_, claim) = claim_unit(&store, &id, Some(2)).await.unwrap();
        assert_eq!(claim, Claim::NeedsFinalize);

        assert!(matches!(
            claim_unit(&store, &id, Some(9)).await,
            Err(OrchestratorError::SegmentOutOfRange { index: 9, count: 4 })
        ));
    }

    #[tokio::test]
    async fn test_single_outcome() {
        let store = InMemoryTaskStore::new();
        let mut task = Task::new("u1", MediaKind::Image, "replicate", "svc", Default::default());
        task.mark_processing().unwrap();
        store.insert(&task).await.unwrap();

        let (updated, s) = record_single_outcome(&store, &task.id, UnitOutcome::Failed("provider_timeout".into()))
            .await
            .unwrap();
        assert_eq!(s, Settlement::ReadyToFinalize);
        assert_eq!(updated.status, TaskStatus::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("provider_timeout"));

        let (_, s) = record_single_outcome(&store, &task.id, done(0)).await.unwrap();
        assert_eq!(s, Settlement::Ignored);
    }
}
