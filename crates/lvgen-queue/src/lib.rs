//! Prioritized job lanes.
//!
//! This crate provides:
//! - Job payloads for generation and segment combination
//! - The [`LaneQueue`] contract with ack-late delivery
//! - A Redis Streams implementation with crash recovery and a DLQ
//! - An in-memory implementation with the same delivery semantics

pub mod error;
pub mod job;
pub mod lane;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{CombineSegmentsJob, GenerationJob, QueueJob, WorkUnit};
pub use lane::{Delivery, LaneQueue};
pub use memory::InMemoryLaneQueue;
pub use queue::{QueueConfig, RedisLaneQueue};
