//! Durable state for the orchestrator.
//!
//! This crate provides:
//! - [`TaskStore`]: atomic per-task updates (Redis WATCH/MULTI or in-memory)
//! - [`CreditLedger`]: idempotent balance checks, debits and refunds
//! - [`ServiceCatalog`]: the billable services a task can be submitted against

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod task_store;

pub use catalog::ServiceCatalog;
pub use error::{LedgerError, LedgerResult, StoreError, StoreResult};
pub use ledger::{
    CreditLedger, CreditRequest, DebitRequest, HttpCreditLedger, InMemoryLedger, LedgerConfig,
};
pub use task_store::{
    InMemoryTaskStore, RedisTaskStore, StoreConfig, TaskStore, TaskStoreExt,
};
