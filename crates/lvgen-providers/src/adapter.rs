//! The provider adapter contract.

use async_trait::async_trait;
use lvgen_models::{InputParams, OutputAsset, Provider};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderResult;
use crate::input::ValidatedInput;
use crate::polling::PollingProfile;

/// Uniform interface over a generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Polling cadence and limits of this backend.
    fn profile(&self) -> &PollingProfile;

    /// Check `raw` against the schema of `model`. Never touches the network.
    fn validate_input(&self, model: &str, raw: &InputParams) -> ProviderResult<ValidatedInput>;

    /// Submit one generation and wait for its output.
    ///
    /// When `cancel` fires the adapter stops polling, asks the backend to
    /// cancel the remote job, and returns `ProviderCancelled`.
    async fn generate(
        &self,
        input: &ValidatedInput,
        cancel: &CancellationToken,
    ) -> ProviderResult<OutputAsset>;

    /// Best-effort remote cancellation. `false` when the backend has no
    /// cancel operation or the request did not succeed.
    async fn cancel(&self, remote_job_id: &str) -> bool;
}
