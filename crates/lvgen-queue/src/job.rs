//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use lvgen_models::{GroupId, InputParams, JobId, Lane, Provider, TaskId};

/// What a generation job produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum WorkUnit {
    /// The whole task in one generation
    Single,
    /// One segment of a long-video task
    Segment {
        group_id: GroupId,
        index: u32,
        total: u32,
        /// Chain off the previous segment's generation when it is available
        #[serde(default)]
        seed_from_previous: bool,
    },
}

impl WorkUnit {
    pub fn segment_index(&self) -> Option<u32> {
        match self {
            WorkUnit::Single => None,
            WorkUnit::Segment { index, .. } => Some(*index),
        }
    }
}

/// Job to run one generation on a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique job ID, stable across redeliveries
    pub job_id: JobId,
    pub task_id: TaskId,
    pub owner_id: String,
    pub provider: Provider,
    pub service_id: String,
    /// Model name passed to the provider adapter
    pub service_name: String,
    pub lane: Lane,
    pub unit: WorkUnit,
    /// Provider input for this unit (segment prompt, duration, seed)
    pub input: InputParams,
    pub created_at: DateTime<Utc>,
}

impl GenerationJob {
    /// Create a single-shot job.
    pub fn new(
        task_id: TaskId,
        owner_id: impl Into<String>,
        provider: Provider,
        service_id: impl Into<String>,
        service_name: impl Into<String>,
        lane: Lane,
        input: InputParams,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            task_id,
            owner_id: owner_id.into(),
            provider,
            service_id: service_id.into(),
            service_name: service_name.into(),
            lane,
            unit: WorkUnit::Single,
            input,
            created_at: Utc::now(),
        }
    }

    /// Turn this job into a segment job.
    pub fn for_segment(mut self, group_id: GroupId, index: u32, total: u32, seed_from_previous: bool) -> Self {
        self.unit = WorkUnit::Segment {
            group_id,
            index,
            total,
            seed_from_previous,
        };
        self
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}:{}", self.task_id, self.job_id)
    }
}

/// Job to stitch the completed segments of a task into one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineSegmentsJob {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl CombineSegmentsJob {
    pub fn new(task_id: TaskId, owner_id: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            task_id,
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }

    /// One combine per task may be queued at a time.
    pub fn idempotency_key(&self) -> String {
        format!("combine:{}", self.task_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Generate(GenerationJob),
    CombineSegments(CombineSegmentsJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::Generate(j) => &j.job_id,
            QueueJob::CombineSegments(j) => &j.job_id,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        match self {
            QueueJob::Generate(j) => &j.task_id,
            QueueJob::CombineSegments(j) => &j.task_id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            QueueJob::Generate(j) => &j.owner_id,
            QueueJob::CombineSegments(j) => &j.owner_id,
        }
    }

    /// Lane the job must be placed on.
    pub fn lane(&self) -> Lane {
        match self {
            QueueJob::Generate(j) => j.lane,
            QueueJob::CombineSegments(_) => Lane::Default,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Generate(j) => j.idempotency_key(),
            QueueJob::CombineSegments(j) => j.idempotency_key(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::Generate(_) => "generate",
            QueueJob::CombineSegments(_) => "combine_segments",
        }
    }
}
