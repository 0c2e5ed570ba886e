//! Worker configuration.

use std::str::FromStr;
use std::time::Duration;

use lvgen_models::Lane;
use tracing::warn;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lanes this process serves, highest priority first
    pub lanes: Vec<Lane>,
    /// Exit after this many acknowledged jobs so the supervisor restarts the
    /// process; 0 disables the limit
    pub max_jobs: usize,
    /// Sleep between polls when every lane is empty
    pub poll_interval: Duration,
    /// How often the worker scans for deliveries abandoned by crashed workers
    pub claim_interval: Duration,
    /// Minimum idle time before a pending delivery can be claimed
    pub claim_min_idle: Duration,
    /// Deliveries before a job is dead-lettered
    pub max_deliveries: u32,
    /// Extra provider attempts after a transient network error
    pub retry_attempts: u32,
    /// Fixed wait between provider attempts
    pub retry_backoff: Duration,
    /// How often a running job re-reads its task to notice cancellation
    pub cancel_check_interval: Duration,
    /// Concatenate segments as soon as the last one completes
    pub auto_combine: bool,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lanes: Lane::by_priority(&Lane::ALL),
            max_jobs: 50,
            poll_interval: Duration::from_millis(1000),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            max_deliveries: 5,
            retry_attempts: 2,
            retry_backoff: Duration::from_secs(60),
            cancel_check_interval: Duration::from_secs(5),
            auto_combine: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a comma separated lane list, skipping unknown names.
pub fn parse_lanes(raw: &str) -> Vec<Lane> {
    let lanes: Vec<Lane> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Lane>() {
            Ok(lane) => Some(lane),
            Err(e) => {
                warn!("Ignoring lane '{}': {}", s, e);
                None
            }
        })
        .collect();
    Lane::by_priority(&lanes)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let lanes = match std::env::var("WORKER_LANES") {
            Ok(raw) => {
                let lanes = parse_lanes(&raw);
                if lanes.is_empty() {
                    defaults.lanes.clone()
                } else {
                    lanes
                }
            }
            Err(_) => defaults.lanes.clone(),
        };

        Self {
            lanes,
            max_jobs: env_or("WORKER_MAX_JOBS", defaults.max_jobs),
            poll_interval: Duration::from_millis(env_or("WORKER_POLL_INTERVAL_MS", 1000)),
            claim_interval: Duration::from_secs(env_or("WORKER_CLAIM_INTERVAL_SECS", 30)),
            claim_min_idle: Duration::from_secs(env_or("WORKER_CLAIM_MIN_IDLE_SECS", 300)),
            max_deliveries: env_or("QUEUE_MAX_DELIVERIES", defaults.max_deliveries),
            retry_attempts: env_or("WORKER_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_backoff: Duration::from_secs(env_or("WORKER_RETRY_BACKOFF_SECS", 60)),
            cancel_check_interval: Duration::from_secs(env_or("WORKER_CANCEL_CHECK_SECS", 5)),
            auto_combine: env_or("WORKER_AUTO_COMBINE", defaults.auto_combine),
            shutdown_timeout: Duration::from_secs(env_or("WORKER_SHUTDOWN_TIMEOUT", 30)),
        }
    }
}
