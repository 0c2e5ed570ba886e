//! Job lanes on Redis Streams.
//!
//! Every lane is its own stream (`{prefix}:{lane}`) read by one shared
//! consumer group. Messages stay in the group's pending list until the
//! worker acknowledges them, so a crashed worker's job is picked up again
//! by [`RedisLaneQueue::claim_stale`].

use std::time::Duration;

use async_trait::async_trait;
use lvgen_models::Lane;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::lane::{Delivery, LaneQueue};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for lane stream names
    pub stream_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Deliveries before a job is dead-lettered
    pub max_deliveries: u32,
    /// How long an enqueued idempotency key blocks duplicates
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_prefix: "lvgen:lane".to_string(),
            consumer_group: "lvgen:workers".to_string(),
            dlq_stream_name: "lvgen:dlq".to_string(),
            max_deliveries: 5,
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_prefix: std::env::var("QUEUE_STREAM_PREFIX").unwrap_or(defaults.stream_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_deliveries: std::env::var("QUEUE_MAX_DELIVERIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_deliveries),
            dedup_ttl: std::env::var("QUEUE_DEDUP_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
        }
    }

    pub fn stream_name(&self, lane: Lane) -> String {
        format!("{}:{}", self.stream_prefix, lane.as_str())
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.stream_prefix, idempotency_key)
    }
}

/// Redis Streams lane queue.
pub struct RedisLaneQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisLaneQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group on every lane stream (idempotent).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for lane in Lane::ALL {
            let stream = self.config.stream_name(lane);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(lane = %lane, "Created consumer group on {}", stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(lane = %lane, "Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Decode a stream entry; malformed payloads are dead-lettered.
    async fn decode_entry(
        &self,
        lane: Lane,
        entry: &StreamId,
        delivery_count: u32,
    ) -> QueueResult<Option<Delivery>> {
        let payload: Option<String> = entry.get("job");
        let Some(payload) = payload else {
            warn!(lane = %lane, message_id = %entry.id, "Stream entry without job payload");
            self.ack_raw(lane, &entry.id).await?;
            return Ok(None);
        };

        match serde_json::from_str::<QueueJob>(&payload) {
            Ok(job) => Ok(Some(Delivery {
                message_id: entry.id.clone(),
                lane,
                job,
                delivery_count,
            })),
            Err(e) => {
                warn!(lane = %lane, message_id = %entry.id, "Failed to parse job payload: {}", e);
                let mut conn = self.conn().await?;
                redis::cmd("XADD")
                    .arg(&self.config.dlq_stream_name)
                    .arg("*")
                    .arg("raw")
                    .arg(&payload)
                    .arg("error")
                    .arg(e.to_string())
                    .arg("original_id")
                    .arg(&entry.id)
                    .query_async::<()>(&mut conn)
                    .await?;
                self.ack_raw(lane, &entry.id).await?;
                Ok(None)
            }
        }
    }

    async fn ack_raw(&self, lane: Lane, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_name(lane);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl LaneQueue for RedisLaneQueue {
    async fn enqueue(&self, job: &QueueJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = self.config.dedup_key(&idempotency_key);

        let reserved: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if reserved.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let lane = job.lane();
        let stream = self.config.stream_name(lane);
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Release the reservation so the caller can retry.
                let _ = conn.del::<_, ()>(&dedup_key).await;
                return Err(QueueError::Append {
                    stream,
                    reason: e.to_string(),
                });
            }
        };

        info!(
            lane = %lane,
            job_id = %job.job_id(),
            task_id = %job.task_id(),
            "Enqueued {} job with message ID {}",
            job.kind(),
            message_id
        );

        Ok(message_id)
    }

    async fn consume(&self, lane: Lane, consumer: &str) -> QueueResult<Option<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(self.config.stream_name(lane))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(delivery) = self.decode_entry(lane, &entry, 1).await? {
                    debug!(lane = %lane, job_id = %delivery.job.job_id(), "Consumed job from stream");
                    return Ok(Some(delivery));
                }
            }
        }

        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.ack_raw(delivery.lane, &delivery.message_id).await?;
        debug!(lane = %delivery.lane, "Acknowledged job: {}", delivery.message_id);
        Ok(())
    }

    async fn claim_stale(
        &self,
        lane: Lane,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_name(lane);
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;

        let mut deliveries = Vec::new();
        for entry in &claimed.ids {
            let previous = pending
                .ids
                .iter()
                .find(|p| p.id == entry.id)
                .map(|p| p.times_delivered as u32)
                .unwrap_or(1);
            if let Some(delivery) = self.decode_entry(lane, entry, previous + 1).await? {
                info!(
                    lane = %lane,
                    job_id = %delivery.job.job_id(),
                    delivery_count = delivery.delivery_count,
                    "Claimed stale job"
                );
                deliveries.push(delivery);
            }
        }

        Ok(deliveries)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("lane")
            .arg(delivery.lane.as_str())
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery).await?;

        warn!(lane = %delivery.lane, "Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    async fn len(&self, lane: Lane) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.stream_name(lane)).await?;
        Ok(len)
    }

    async fn release(&self, job: &QueueJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.config.dedup_key(&job.idempotency_key()))
            .await?;
        Ok(())
    }
}
