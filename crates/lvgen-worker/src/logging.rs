//! Per-job log context.

use lvgen_models::{JobId, TaskId};
use tracing::{error, info, warn, Span};

/// Emits job events under one `job` span so every line carries the job id,
/// kind, task and segment without repeating them at each call site.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: &'static str,
    segment: Option<u32>,
    span: Span,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: &'static str, task_id: &TaskId, segment: Option<u32>) -> Self {
        let span = tracing::info_span!(
            "job",
            job_id = %job_id,
            kind,
            task_id = %task_id,
            segment = ?segment,
        );
        Self {
            job_id: job_id.to_string(),
            kind,
            segment,
            span,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn started(&self, message: &str) {
        info!(parent: &self.span, "{} started: {}", self.kind, message);
    }

    pub fn progress(&self, message: &str) {
        info!(parent: &self.span, "{}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(parent: &self.span, "{}", message);
    }

    pub fn failed(&self, message: &str) {
        error!(parent: &self.span, "{} failed: {}", self.kind, message);
    }

    pub fn finished(&self, message: &str) {
        info!(parent: &self.span, "{} finished: {}", self.kind, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_keeps_job_context() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "generate", &TaskId::from_string("t1"), Some(3));

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.kind(), "generate");
        assert_eq!(logger.segment, Some(3));
    }
}
