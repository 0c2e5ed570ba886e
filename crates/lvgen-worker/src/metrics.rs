//! Worker metrics.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Serve Prometheus metrics on `addr` (`GET /metrics`).
pub fn init_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub mod names {
    // =========================================================================
    // Jobs
    // =========================================================================

    /// Jobs taken from a lane.
    pub const JOBS_STARTED_TOTAL: &str = "lvgen_worker_jobs_started_total";

    /// Jobs acknowledged after running to the end.
    pub const JOBS_COMPLETED_TOTAL: &str = "lvgen_worker_jobs_completed_total";

    /// Jobs left unacknowledged for redelivery.
    pub const JOBS_FAILED_TOTAL: &str = "lvgen_worker_jobs_failed_total";

    /// Jobs moved to the dead letter stream.
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "lvgen_worker_jobs_dead_lettered_total";

    // =========================================================================
    // Providers
    // =========================================================================

    pub const PROVIDER_ATTEMPTS_TOTAL: &str = "lvgen_provider_attempts_total";

    pub const PROVIDER_RETRIES_TOTAL: &str = "lvgen_provider_retries_total";

    /// Seconds from submit to output, successful generations only.
    pub const PROVIDER_LATENCY_SECONDS: &str = "lvgen_provider_latency_seconds";

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Unit outcomes by kind (completed/failed/cancelled).
    pub const UNITS_SETTLED_TOTAL: &str = "lvgen_units_settled_total";

    pub const COMBINED_VIDEOS_TOTAL: &str = "lvgen_combined_videos_total";

    pub const EDIT_SURCHARGES_TOTAL: &str = "lvgen_edit_surcharges_total";
}

pub fn record_job_started(lane: &'static str, kind: &'static str) {
    counter!(names::JOBS_STARTED_TOTAL, "lane" => lane, "kind" => kind).increment(1);
}

pub fn record_job_completed(lane: &'static str, kind: &'static str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "lane" => lane, "kind" => kind).increment(1);
}

pub fn record_job_failed(lane: &'static str, kind: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "lane" => lane, "kind" => kind).increment(1);
}

pub fn record_dead_lettered(lane: &'static str) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, "lane" => lane).increment(1);
}

pub fn record_provider_attempt(provider: &str) {
    counter!(names::PROVIDER_ATTEMPTS_TOTAL, "provider" => provider.to_string()).increment(1);
}

pub fn record_provider_retry(provider: &str) {
    counter!(names::PROVIDER_RETRIES_TOTAL, "provider" => provider.to_string()).increment(1);
}

pub fn record_provider_latency(provider: &str, elapsed: Duration) {
    histogram!(names::PROVIDER_LATENCY_SECONDS, "provider" => provider.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_unit_settled(outcome: &'static str) {
    counter!(names::UNITS_SETTLED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_combined(outcome: &'static str) {
    counter!(names::COMBINED_VIDEOS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_edit_surcharge(outcome: &'static str) {
    counter!(names::EDIT_SURCHARGES_TOTAL, "outcome" => outcome).increment(1);
}
