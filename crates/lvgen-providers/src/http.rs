//! HTTP helpers shared by the adapters.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderResult};

pub(crate) fn build_client(timeout: Duration) -> ProviderResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::config(format!("failed to build HTTP client: {e}")))
}

/// Decode a JSON body, classifying non-success statuses.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> ProviderResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status, &body));
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ProviderError::malformed)
}

pub(crate) fn env_duration_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}
