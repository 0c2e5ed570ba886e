//! Long-video orchestration.
//!
//! Entry points ([`Orchestrator`]) plan a request into segments, persist the
//! task, debit the ledger and dispatch one job per segment onto the lane of
//! the task's provider. Workers report back through [`completion`], which
//! aggregates segment outcomes into the parent task.

pub mod completion;
pub mod credits;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod planner;
pub mod routing;
pub mod service;

pub use completion::{Claim, FinalizeMode, Settlement, UnitOutcome};
pub use dispatcher::SegmentDispatcher;
pub use error::{OrchestratorError, OrchestratorResult};
pub use planner::{plan, plan_generic, PlanError, SegmentsInput};
pub use routing::{resolve, Route};
pub use service::{LongVideoRequest, Orchestrator, SubmitRequest};
