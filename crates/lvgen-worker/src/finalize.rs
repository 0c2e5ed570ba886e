//! Group finalization.
//!
//! Completes a long-video task whose segments all completed, optionally
//! stitching them into one video first. A failed combination is logged and
//! the task completes with the per-segment outputs.

use std::path::{Path, PathBuf};

use lvgen_models::{AssetMetadata, LocalPaths, MediaKind, OutputAsset, Task, TaskId};
use lvgen_orchestrator::completion::{finalize_group, FinalizeMode};
use lvgen_orchestrator::OrchestratorError;
use lvgen_storage::{combined_key, thumbnail_key};
use lvgen_store::TaskStoreExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::JobProcessor;

impl JobProcessor {
    /// Finalize the task's segment group. Returns whether the task changed.
    pub async fn finalize(&self, task_id: &TaskId, mode: FinalizeMode) -> WorkerResult<bool> {
        let task = self.store.require(task_id).await?;
        if task.long_video.is_none() {
            return Err(OrchestratorError::NotALongVideoTask(task_id.to_string()).into());
        }

        let combined = if self.config.auto_combine || mode == FinalizeMode::Explicit {
            match self.combine(&task).await {
                Ok(combined) => {
                    metrics::record_combined("ok");
                    Some(combined)
                }
                Err(e) => {
                    metrics::record_combined("failed");
                    warn!(task_id = %task_id, "Combination failed, keeping segment outputs: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let (task, changed) = finalize_group(self.store.as_ref(), task_id, combined, mode).await?;
        if changed {
            info!(
                task_id = %task_id,
                status = %task.status.as_str(),
                outputs = task.outputs.len(),
                "Task finalized"
            );
        }
        Ok(changed)
    }

    /// Concatenate the completed segments in segment order.
    async fn combine(&self, task: &Task) -> WorkerResult<(OutputAsset, LocalPaths)> {
        let lv = task
            .long_video
            .as_ref()
            .ok_or_else(|| WorkerError::unprocessable("task has no segments"))?;

        let mut ordered: Vec<PathBuf> = Vec::with_capacity(lv.segments.len());
        for (index, output) in lv.ordered_outputs() {
            ordered.push(self.media.ensure_segment_file(&task.id, index, output).await?);
        }
        if ordered.len() != lv.segments.len() {
            return Err(WorkerError::unprocessable(format!(
                "{} of {} segments have an output",
                ordered.len(),
                lv.segments.len()
            )));
        }

        let paths = self
            .media
            .combine_segments(&task.id, &ordered, &CancellationToken::new())
            .await?;
        let video = paths
            .video_path
            .clone()
            .ok_or_else(|| WorkerError::unprocessable("combination produced no file"))?;

        let url = match &self.blobs {
            Some(blobs) => {
                let url = blobs
                    .upload_file(&video, &combined_key(&task.owner_id, &task.id), "video/mp4")
                    .await?;
                if let Some(thumb) = &paths.thumbnail_path {
                    if let Err(e) = blobs
                        .upload_file(thumb, &thumbnail_key(&task.owner_id, &task.id), "image/jpeg")
                        .await
                    {
                        warn!(task_id = %task.id, "Thumbnail mirror failed: {}", e);
                    }
                }
                url
            }
            None => format!("file://{video}"),
        };

        let info = self.media.describe(Path::new(&video)).await;
        let mut asset = OutputAsset::new(url, MediaKind::Video)
            .with_mime_type("video/mp4")
            .with_metadata(AssetMetadata {
                provider: task.provider.clone(),
                model: task.service_id.clone(),
                extra: [("combined_segments".to_string(), ordered.len().to_string())].into(),
                ..Default::default()
            });
        if let Some(size) = info.size {
            asset = asset.with_size(size);
        }
        if let Some(duration) = info.duration {
            asset = asset.with_duration(duration);
        }
        if let (Some(w), Some(h)) = (info.width, info.height) {
            asset = asset.with_dimensions(w, h);
        }

        Ok((asset, paths))
    }
}
