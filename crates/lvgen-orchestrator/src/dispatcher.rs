//! Segment dispatcher.
//!
//! Turns a planned task into generation jobs and places them on the lane of
//! the task's route. Jobs are built and validated in full before the first
//! enqueue, so a bad segment never leaves a partial dispatch behind.

use std::sync::Arc;

use lvgen_models::{GroupId, InputParams, JobId, Segment, Service, Task};
use lvgen_providers::input::validate_for;
use lvgen_providers::ProviderResult;
use lvgen_queue::{GenerationJob, LaneQueue, QueueJob, QueueResult};
use serde_json::Value;
use tracing::{debug, info};

use crate::routing::Route;

/// Task input flag asking segments to chain off the previous generation.
pub const CONTINUITY_KEY: &str = "continuity";

/// Prefix a segment prompt with its position in the group.
pub fn segment_prompt(group_id: &GroupId, index: u32, total: u32, prompt: &str) -> String {
    format!("[Segment {}/{} | group {}] {}", index + 1, total, group_id, prompt)
}

pub fn continuity_requested(task: &Task) -> bool {
    task.input
        .get(CONTINUITY_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Provider input for one segment, derived from the task input.
pub fn segment_input(task: &Task, segment: &Segment, total: u32, group_id: &GroupId) -> InputParams {
    let mut input = task.input.clone();
    input.remove(CONTINUITY_KEY);
    input.insert(
        "prompt".into(),
        segment_prompt(group_id, segment.segment_id, total, &segment.prompt).into(),
    );
    input.insert("duration".into(), segment.duration().into());
    match &segment.seed_image_url {
        Some(url) => {
            input.insert("seed_image_url".into(), url.clone().into());
        }
        None => {
            input.remove("seed_image_url");
        }
    }
    input
}

/// Job for segment `index` of a dispatched long-video task.
pub fn segment_job(
    task: &Task,
    service: &Service,
    route: &Route,
    group_id: &GroupId,
    index: u32,
) -> Option<GenerationJob> {
    let lv = task.long_video.as_ref()?;
    let segment = lv.segment(index)?;
    let total = lv.num_segments();

    let job = GenerationJob::new(
        task.id.clone(),
        &task.owner_id,
        route.provider,
        &service.id,
        &service.name,
        route.lane,
        segment_input(task, segment, total, group_id),
    )
    .for_segment(group_id.clone(), index, total, continuity_requested(task));
    Some(job)
}

/// Every job a fresh dispatch of `task` needs, in segment index order.
pub fn build_jobs(task: &Task, service: &Service, route: &Route, group_id: &GroupId) -> Vec<GenerationJob> {
    match &task.long_video {
        Some(lv) => (0..lv.num_segments())
            .filter_map(|i| segment_job(task, service, route, group_id, i))
            .collect(),
        None => {
            let mut input = task.input.clone();
            input.remove(CONTINUITY_KEY);
            vec![GenerationJob::new(
                task.id.clone(),
                &task.owner_id,
                route.provider,
                &service.id,
                &service.name,
                route.lane,
                input,
            )]
        }
    }
}

/// Check every job input against the route's model schema.
pub fn validate_jobs(route: &Route, jobs: &[GenerationJob]) -> ProviderResult<()> {
    for job in jobs {
        validate_for(route.model, &job.input)?;
    }
    Ok(())
}

/// Places generation jobs on their lanes.
#[derive(Clone)]
pub struct SegmentDispatcher {
    queue: Arc<dyn LaneQueue>,
}

impl SegmentDispatcher {
    pub fn new(queue: Arc<dyn LaneQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue `jobs` in order. A job already queued under the same
    /// idempotency key counts as enqueued.
    pub async fn enqueue_all(&self, jobs: Vec<GenerationJob>) -> QueueResult<Vec<JobId>> {
        let mut job_ids = Vec::with_capacity(jobs.len());

        for job in jobs {
            let job_id = job.job_id.clone();
            let lane = job.lane;
            let segment = job.unit.segment_index();

            match self.queue.enqueue(&QueueJob::Generate(job)).await {
                Ok(message_id) => {
                    debug!(job_id = %job_id, lane = %lane, segment = ?segment, message_id = %message_id, "Enqueued job");
                }
                Err(e) if e.is_duplicate() => {
                    debug!(job_id = %job_id, lane = %lane, "Job already enqueued");
                }
                Err(e) => return Err(e),
            }
            job_ids.push(job_id);
        }

        info!(jobs = job_ids.len(), "Dispatched jobs");
        Ok(job_ids)
    }

    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<JobId> {
        let job_id = job.job_id().clone();
        match self.queue.enqueue(&job).await {
            Ok(_) => Ok(job_id),
            Err(e) if e.is_duplicate() => Ok(job_id),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{plan, SegmentsInput};
    use crate::routing::resolve;
    use lvgen_models::{Lane, MediaKind, Service};
    use lvgen_queue::{InMemoryLaneQueue, WorkUnit};

    fn long_task(continuity: bool) -> (Task, Service) {
        let service = Service::new("luma-ray-2", "ray-2", "luma", MediaKind::Video, 6);
        let mut input = InputParams::new();
        input.insert("prompt".into(), "base".into());
        input.insert("aspect_ratio".into(), "16:9".into());
        if continuity {
            input.insert(CONTINUITY_KEY.into(), true.into());
        }
        let config = plan(
            32,
            &SegmentsInput::new(["a cat", "a dog"]).with_seed_image_url("https://cdn/seed.png"),
        )
        .unwrap();
        let task = Task::new("u1", MediaKind::Video, "luma", &service.id, input).with_long_video(config);
        (task, service)
    }

    #[test]
    fn test_segment_input_embeds_marker() {
        let (task, _) = long_task(true);
        let group = GroupId::from_string("g1");
        let lv = task.long_video.as_ref().unwrap();
        let input = segment_input(&task, &lv.segments[2], 4, &group);

        assert_eq!(input["prompt"], "[Segment 3/4 | group g1] a dog");
        assert_eq!(input["duration"], 8);
        assert_eq!(input["seed_image_url"], "https://cdn/seed.png");
        assert_eq!(input["aspect_ratio"], "16:9");
        assert!(!input.contains_key(CONTINUITY_KEY));
    }

    #[test]
    fn test_build_jobs_in_index_order() {
        let (task, service) = long_task(true);
        let route = resolve("luma", "ray-2").unwrap();
        let group = GroupId::new();
        let jobs = build_jobs(&task, &service, &route, &group);

        assert_eq!(jobs.len(), 4);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.lane, Lane::Luma);
            assert_eq!(
                job.unit,
                WorkUnit::Segment {
                    group_id: group.clone(),
                    index: i as u32,
                    total: 4,
                    seed_from_previous: true,
                }
            );
        }
        validate_jobs(&route, &jobs).unwrap();
    }

    #[test]
    fn test_single_shot_job() {
        let service = Service::new("replicate-flux-schnell", "flux-schnell", "replicate", MediaKind::Image, 1);
        let mut input = InputParams::new();
        input.insert("prompt".into(), "a lighthouse".into());
        let task = Task::new("u1", MediaKind::Image, "replicate", &service.id, input);
        let route = resolve("replicate", "flux-schnell").unwrap();

        let jobs = build_jobs(&task, &service, &route, &GroupId::new());
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].unit, WorkUnit::Single);
        assert_eq!(jobs[0].input["prompt"], "a lighthouse");
    }

    #[tokio::test]
    async fn test_enqueue_all_lands_on_lane() {
        let (task, service) = long_task(false);
        let route = resolve("luma", "ray-2").unwrap();
        let jobs = build_jobs(&task, &service, &route, &GroupId::new());

        let queue = Arc::new(InMemoryLaneQueue::new());
        let dispatcher = SegmentDispatcher::new(queue.clone());
        let ids = dispatcher.enqueue_all(jobs).await.unwrap();

        assert_eq!(ids.len(), 4);
        assert_eq!(queue.len(Lane::Luma).await.unwrap(), 4);
        assert_eq!(queue.len(Lane::Default).await.unwrap(), 0);
    }
}
