//! Task/segment state store.
//!
//! A task document is the single source of truth for a task and all of its
//! segments. Every write goes through [`TaskStore::update`], which applies a
//! mutation atomically to the latest stored version. Mutations may be
//! re-run after a lost race, so they must only depend on the task they are
//! given.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lvgen_models::{Task, TaskId};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::metrics;

/// Maximum optimistic-lock attempts for one update.
const MAX_UPDATE_RETRIES: u32 = 5;

/// Base delay between attempts (multiplied by attempt number).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// A mutation applied inside an atomic update.
pub type Mutation<'a> = &'a (dyn Fn(&mut Task) -> StoreResult<()> + Send + Sync);

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task. Fails if the id is taken.
    async fn insert(&self, task: &Task) -> StoreResult<()>;

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Atomically apply `mutation` to the stored task and return the result.
    ///
    /// An error from the mutation aborts the update without writing.
    async fn update(&self, id: &TaskId, mutation: Mutation<'_>) -> StoreResult<Task>;
}

/// Conveniences layered on [`TaskStore`].
#[async_trait]
pub trait TaskStoreExt: TaskStore {
    /// Load a task, failing with [`StoreError::NotFound`] when absent.
    async fn require(&self, id: &TaskId) -> StoreResult<Task> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    /// Run an update whose mutation also computes a value.
    ///
    /// When the mutation returns `Err`, nothing is written and that error is
    /// returned as is.
    async fn update_with<R, E, F>(&self, id: &TaskId, mutation: F) -> Result<(Task, R), E>
    where
        R: Send,
        E: From<StoreError> + Send,
        F: Fn(&mut Task) -> Result<R, E> + Send + Sync,
    {
        let slot: Mutex<Option<Result<R, E>>> = Mutex::new(None);

        let outcome = self
            .update(id, &|task: &mut Task| {
                let result = mutation(task);
                let aborted = result.is_err();
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                if aborted {
                    Err(StoreError::Aborted)
                } else {
                    Ok(())
                }
            })
            .await;

        let captured = slot.into_inner().unwrap_or_else(PoisonError::into_inner);
        match (outcome, captured) {
            (Ok(task), Some(Ok(value))) => Ok((task, value)),
            (Err(StoreError::Aborted), Some(Err(e))) => Err(e),
            (Err(e), _) => Err(e.into()),
            (Ok(_), _) => Err(StoreError::internal("update finished without a mutation result").into()),
        }
    }
}

impl<S: TaskStore + ?Sized> TaskStoreExt for S {}

// =============================================================================
// Redis
// =============================================================================

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
    /// Prefix for task keys
    pub key_prefix: String,
    /// Retention of task documents
    pub task_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "lvgen:task".to_string(),
            task_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            task_ttl: std::env::var("STORE_TASK_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_ttl),
        }
    }

    pub fn task_key(&self, id: &TaskId) -> String {
        format!("{}:{}", self.key_prefix, id)
    }
}

/// Task documents stored as JSON strings, updated with WATCH/MULTI/EXEC.
pub struct RedisTaskStore {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisTaskStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    // WATCH is connection scoped, so every update opens its own connection.
    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn unwatch(conn: &mut redis::aio::MultiplexedConnection) {
        if let Err(e) = redis::cmd("UNWATCH").query_async::<()>(conn).await {
            debug!("UNWATCH failed: {}", e);
        }
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn insert(&self, task: &Task) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let key = self.config.task_key(&task.id);
        let payload = serde_json::to_string(task)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(self.config.task_ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(StoreError::AlreadyExists(task.id.to_string()));
        }
        debug!(task_id = %task.id, "Inserted task");
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.config.task_key(id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn update(&self, id: &TaskId, mutation: Mutation<'_>) -> StoreResult<Task> {
        let key = self.config.task_key(id);

        for attempt in 0..MAX_UPDATE_RETRIES {
            let mut conn = self.conn().await?;

            redis::cmd("WATCH")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await?;

            let raw: Option<String> = conn.get(&key).await?;
            let Some(raw) = raw else {
                Self::unwatch(&mut conn).await;
                return Err(StoreError::not_found(id.as_str()));
            };

            let mut task: Task = match serde_json::from_str(&raw) {
                Ok(task) => task,
                Err(e) => {
                    Self::unwatch(&mut conn).await;
                    return Err(e.into());
                }
            };

            if let Err(e) = mutation(&mut task) {
                Self::unwatch(&mut conn).await;
                return Err(e);
            }
            task.touch();
            let payload = serde_json::to_string(&task)?;

            let committed: Option<()> = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(&key)
                .arg(payload)
                .arg("EX")
                .arg(self.config.task_ttl.as_secs())
                .ignore()
                .query_async(&mut conn)
                .await?;

            if committed.is_some() {
                return Ok(task);
            }

            // EXEC returned nil: another writer touched the key.
            metrics::record_conflict();
            debug!(
                task_id = %id,
                attempt = attempt + 1,
                "Task update lost optimistic race, retrying"
            );
            let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
            tokio::time::sleep(delay).await;
        }

        warn!(
            task_id = %id,
            retries = MAX_UPDATE_RETRIES,
            "Task update failed after retries"
        );
        Err(StoreError::Conflict(id.to_string()))
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store for tests and single-process development.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Snapshot of every stored task.
    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: &Task) -> StoreResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id.to_string()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn update(&self, id: &TaskId, mutation: Mutation<'_>) -> StoreResult<Task> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;

        let mut next = stored.clone();
        mutation(&mut next)?;
        next.touch();
        *stored = next.clone();
        Ok(next)
    }
}
