//! Shared data models for the long-video generation backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks and their lifecycle
//! - Long-video segment plans
//! - Output assets produced by providers
//! - Services, providers and queue lanes
//! - Credit transactions

pub mod asset;
pub mod credit_transaction;
pub mod ids;
pub mod long_video;
pub mod provider;
pub mod service;
pub mod task;

// Re-export common types
pub use asset::{AssetMetadata, LocalPaths, MediaKind, OutputAsset};
pub use credit_transaction::{CreditTransaction, CreditTransactionType};
pub use ids::{GroupId, JobId, TaskId};
pub use long_video::{
    LongVideoConfig, Segment, SegmentGroupState, SegmentStatus, DEFAULT_CREDITS_PER_SEGMENT, EDIT_SURCHARGE_CREDITS,
    LONG_VIDEO_DURATIONS, MAX_GENERIC_DURATION, MIN_GENERIC_DURATION, SEGMENT_SECONDS,
};
pub use provider::{Lane, Provider, UnknownProvider};
pub use service::Service;
pub use task::{InputParams, Task, TaskStatus, TransitionError};
