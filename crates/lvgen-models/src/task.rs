//! The task record and its lifecycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{LocalPaths, LongVideoConfig, MediaKind, OutputAsset, TaskId};

/// Opaque, provider-specific input parameters.
pub type InputParams = BTreeMap<String, serde_json::Value>;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Persisted, not yet dispatched
    #[default]
    Pending,
    /// Jobs have been enqueued
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Allowed lifecycle edges. Terminal states are absorbing.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A unit of user-requested generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub id: TaskId,

    pub owner_id: String,

    pub kind: MediaKind,

    #[serde(default)]
    pub status: TaskStatus,

    /// Provider name as requested; kept as a string so unroutable
    /// requests can still be persisted.
    pub provider: String,

    pub service_id: String,

    #[serde(default)]
    pub input: InputParams,

    #[serde(default)]
    pub outputs: Vec<OutputAsset>,

    #[serde(default)]
    pub local_paths: LocalPaths,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_secs: Option<f64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_video: Option<LongVideoConfig>,
}

impl Task {
    pub fn new(
        owner_id: impl Into<String>,
        kind: MediaKind,
        provider: impl Into<String>,
        service_id: impl Into<String>,
        input: InputParams,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            owner_id: owner_id.into(),
            kind,
            status: TaskStatus::Pending,
            provider: provider.into(),
            service_id: service_id.into(),
            input,
            outputs: Vec::new(),
            local_paths: LocalPaths::default(),
            error_message: None,
            processing_time_secs: None,
            created_at: now,
            updated_at: now,
            long_video: None,
        }
    }

    pub fn with_long_video(mut self, config: LongVideoConfig) -> Self {
        self.long_video = Some(config);
        self
    }

    pub fn is_long_video(&self) -> bool {
        self.long_video.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next`, enforcing the lifecycle graph.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Processing)?;
        self.error_message = None;
        Ok(())
    }

    pub fn complete(&mut self, outputs: Vec<OutputAsset>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Completed)?;
        self.outputs = outputs;
        self.processing_time_secs = Some(self.elapsed_secs());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error_message = Some(message.into());
        self.processing_time_secs = Some(self.elapsed_secs());
        Ok(())
    }

    /// Cancel the task and every non-terminal segment.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Cancelled)?;
        if let Some(lv) = self.long_video.as_mut() {
            lv.cancel_open_segments();
        }
        Ok(())
    }

    fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.created_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}
