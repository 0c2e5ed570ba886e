//! Credit accounting against the external ledger.
//!
//! Every ledger call is keyed so that a retried submit or a redelivered job
//! replays the original transaction instead of charging twice.

use lvgen_models::{CreditTransaction, JobId, Service, Task, TaskId, EDIT_SURCHARGE_CREDITS};
use lvgen_store::{CreditLedger, CreditRequest, DebitRequest, LedgerResult};

pub fn dispatch_key(task_id: &TaskId) -> String {
    format!("task:{task_id}:dispatch")
}

pub fn refund_key(task_id: &TaskId) -> String {
    format!("task:{task_id}:refund")
}

pub fn edit_key(job_id: &JobId) -> String {
    format!("job:{job_id}:edit")
}

/// Credits a task costs up front: per segment for long videos, the
/// service's flat price otherwise.
pub fn task_cost(task: &Task, service: &Service) -> u32 {
    match &task.long_video {
        Some(lv) => lv.total_cost(),
        None => service.cost_per_generation,
    }
}

pub async fn debit_dispatch(
    ledger: &dyn CreditLedger,
    task: &Task,
    cost: u32,
) -> LedgerResult<CreditTransaction> {
    let description = match &task.long_video {
        Some(lv) => format!("Long video: {} segments", lv.num_segments()),
        None => format!("Generation: {}", task.service_id),
    };
    ledger
        .check_and_debit(
            DebitRequest::new(&task.owner_id, cost, dispatch_key(&task.id))
                .for_task(task.id.as_str(), &task.service_id)
                .with_description(description),
        )
        .await
}

pub async fn refund_dispatch(
    ledger: &dyn CreditLedger,
    task: &Task,
    cost: u32,
) -> LedgerResult<CreditTransaction> {
    ledger
        .credit(
            CreditRequest::refund(&task.owner_id, cost, refund_key(&task.id))
                .for_task(task.id.as_str())
                .with_description("Dispatch failed before any job ran"),
        )
        .await
}

/// Surcharge for generating a segment whose prompt was edited.
pub async fn charge_edit_surcharge(
    ledger: &dyn CreditLedger,
    owner_id: &str,
    task_id: &TaskId,
    job_id: &JobId,
    segment: u32,
) -> LedgerResult<CreditTransaction> {
    ledger
        .check_and_debit(
            DebitRequest::new(owner_id, EDIT_SURCHARGE_CREDITS, edit_key(job_id))
                .with_description(format!("Edited segment {segment} of task {task_id}")),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{plan, SegmentsInput};
    use lvgen_models::MediaKind;
    use lvgen_store::InMemoryLedger;

    #[test]
    fn test_keys() {
        let task = TaskId::from_string("t1");
        assert_eq!(dispatch_key(&task), "task:t1:dispatch");
        assert_eq!(refund_key(&task), "task:t1:refund");
        assert_eq!(edit_key(&JobId::from_string("j1")), "job:j1:edit");
    }

    #[test]
    fn test_task_cost() {
        let service = Service::new("svc", "ray-2", "luma", MediaKind::Video, 6);
        let single = Task::new("u", MediaKind::Video, "luma", "svc", Default::default());
        assert_eq!(task_cost(&single, &service), 6);

        let config = plan(56, &SegmentsInput::new(["p"]).with_credits_per_segment(2)).unwrap();
        let long = single.clone().with_long_video(config);
        assert_eq!(task_cost(&long, &service), 14);
    }

    #[tokio::test]
    async fn test_edit_surcharge_is_charged_once_per_job() {
        let ledger = InMemoryLedger::new().with_balance("u1", 3);
        let task = TaskId::from_string("t1");
        let job = JobId::from_string("j1");

        charge_edit_surcharge(&ledger, "u1", &task, &job, 2).await.unwrap();
        charge_edit_surcharge(&ledger, "u1", &task, &job, 2).await.unwrap();
        assert_eq!(ledger.balance("u1").await.unwrap(), 2);
    }
}
