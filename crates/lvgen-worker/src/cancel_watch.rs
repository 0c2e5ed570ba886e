//! Cancellation watch for a running job.
//!
//! Cancellation is recorded in the task store only. While a job runs, a
//! background task re-reads the task and fires the job's token once the
//! task is terminal; the adapter then asks the backend to cancel.

use std::sync::Arc;
use std::time::Duration;

use lvgen_models::TaskId;
use lvgen_store::TaskStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stops watching when dropped.
pub struct CancelWatch {
    handle: JoinHandle<()>,
}

impl CancelWatch {
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        task_id: TaskId,
        token: CancellationToken,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.get(&task_id).await {
                            Ok(Some(task)) if task.status.is_terminal() => {
                                info!(task_id = %task_id, status = %task.status.as_str(), "Task ended while job was running, cancelling");
                                token.cancel();
                                break;
                            }
                            Ok(Some(_)) => {}
                            Ok(None) => {
                                warn!(task_id = %task_id, "Task disappeared while job was running, cancelling");
                                token.cancel();
                                break;
                            }
                            Err(e) => debug!(task_id = %task_id, "Cancellation check failed: {}", e),
                        }
                    }
                }
            }
        });

        Self { handle }
    }
}

impl Drop for CancelWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvgen_models::{MediaKind, Task};
    use lvgen_store::{InMemoryTaskStore, TaskStoreExt};

    #[tokio::test]
    async fn test_fires_on_cancel() {
        let store = Arc::new(InMemoryTaskStore::new());
        let mut task = Task::new("u1", MediaKind::Image, "replicate", "replicate-flux-schnell", Default::default());
        task.mark_processing().unwrap();
        store.insert(&task).await.unwrap();

        let token = CancellationToken::new();
        let _watch = CancelWatch::spawn(store.clone(), task.id.clone(), token.clone(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());

        store
            .update_with(&task.id, |t: &mut Task| -> lvgen_store::StoreResult<()> {
                t.cancel().map_err(|e| lvgen_store::StoreError::internal(e.to_string()))
            })
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_task_cancels() {
        let store = Arc::new(InMemoryTaskStore::new());
        let token = CancellationToken::new();
        let _watch = CancelWatch::spawn(store, TaskId::from_string("gone"), token.clone(), Duration::from_millis(5));

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }
}
