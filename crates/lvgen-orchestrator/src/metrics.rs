//! Orchestrator metrics.

use metrics::counter;

pub mod names {
    /// Submitted tasks by provider and outcome.
    pub const TASKS_SUBMITTED_TOTAL: &str = "lvgen_tasks_submitted_total";

    /// Generation jobs placed on a lane.
    pub const JOBS_DISPATCHED_TOTAL: &str = "lvgen_jobs_dispatched_total";

    /// Pause/resume/redispatch/cancel/combine requests.
    pub const CONTROL_REQUESTS_TOTAL: &str = "lvgen_control_requests_total";
}

pub fn record_submit(provider: &str, outcome: &'static str) {
    counter!(
        names::TASKS_SUBMITTED_TOTAL,
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dispatched(lane: &'static str, jobs: usize) {
    counter!(names::JOBS_DISPATCHED_TOTAL, "lane" => lane).increment(jobs as u64);
}

pub fn record_control(operation: &'static str) {
    counter!(names::CONTROL_REQUESTS_TOTAL, "operation" => operation).increment(1);
}
