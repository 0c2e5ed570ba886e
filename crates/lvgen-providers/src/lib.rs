//! Provider adapters.
//!
//! Every generation backend is wrapped behind [`ProviderAdapter`], which
//! validates input against the backend's schema, runs one generation to
//! completion (submit then poll), and offers best-effort remote cancellation.
//!
//! Failures are mapped into the closed [`ProviderError`] taxonomy; only
//! [`ProviderError::TransientNetwork`] is worth retrying.

pub mod adapter;
pub mod error;
mod http;
pub mod input;
pub mod luma;
pub mod polling;
pub mod registry;
pub mod replicate;
pub mod runway;

pub use adapter::ProviderAdapter;
pub use error::{ProviderError, ProviderResult};
pub use input::{AspectRatio, DurationRule, ModelSpec, SafetyFilter, ValidatedInput};
pub use luma::{LumaAdapter, LumaConfig};
pub use polling::{poll_until, PollStatus, PollingProfile};
pub use registry::ProviderRegistry;
pub use replicate::{ReplicateAdapter, ReplicateConfig};
pub use runway::{RunwayAdapter, RunwayConfig};
