//! Runway image-to-video tasks API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lvgen_models::{AssetMetadata, InputParams, MediaKind, OutputAsset, Provider};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::ProviderAdapter;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{build_client, env_duration_secs, read_json};
use crate::input::{guess_mime, validate_for, AspectRatio, DurationRule, ModelSpec, ValidatedInput};
use crate::polling::{poll_until, PollStatus, PollingProfile};

const API_VERSION: &str = "2024-11-06";

pub const RUNWAY_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "gen3a_turbo",
        remote_id: "gen3a_turbo",
        kind: MediaKind::Video,
        max_prompt_chars: 512,
        durations: DurationRule::Range { min: 5, max: 10 },
        aspect_ratios: &[AspectRatio::Landscape, AspectRatio::Portrait],
        requires_seed_image: true,
    },
    ModelSpec {
        name: "gen4_turbo",
        remote_id: "gen4_turbo",
        kind: MediaKind::Video,
        max_prompt_chars: 1000,
        durations: DurationRule::Range { min: 5, max: 10 },
        aspect_ratios: &[AspectRatio::Landscape, AspectRatio::Portrait, AspectRatio::Square],
        requires_seed_image: true,
    },
];

/// Output resolution string Runway expects for a model and aspect ratio.
fn runway_ratio(model: &str, ratio: AspectRatio) -> &'static str {
    match (model, ratio) {
        ("gen3a_turbo", AspectRatio::Portrait) => "768:1280",
        ("gen3a_turbo", _) => "1280:768",
        (_, AspectRatio::Portrait) => "720:1280",
        (_, AspectRatio::Square) => "960:960",
        _ => "1280:720",
    }
}

/// Runway configuration.
#[derive(Debug, Clone)]
pub struct RunwayConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub profile: PollingProfile,
}

impl RunwayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.dev.runwayml.com".to_string(),
            request_timeout: Duration::from_secs(30),
            profile: PollingProfile::new(
                Duration::from_secs(10),
                Duration::from_secs(20 * 60),
                Duration::from_secs(30 * 60),
            ),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let key = std::env::var("RUNWAY_API_KEY")
            .map_err(|_| ProviderError::config("RUNWAY_API_KEY not set"))?;
        let mut config = Self::new(key);
        if let Ok(url) = std::env::var("RUNWAY_BASE_URL") {
            config.base_url = url;
        }
        config.request_timeout = env_duration_secs("RUNWAY_TIMEOUT_SECS", 30);
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_profile(mut self, profile: PollingProfile) -> Self {
        self.profile = profile;
        self
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunwayTask {
    status: String,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default, rename = "failureCode")]
    failure_code: Option<String>,
}

pub struct RunwayAdapter {
    client: Client,
    config: RunwayConfig,
}

impl RunwayAdapter {
    pub fn new(config: RunwayConfig) -> ProviderResult<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(RunwayConfig::from_env()?)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url, path))
            .bearer_auth(&self.config.api_key)
            .header("X-Runway-Version", API_VERSION)
    }

    fn build_body(input: &ValidatedInput) -> Value {
        let mut body = json!({
            "model": input.model,
            "promptText": input.prompt,
            "ratio": runway_ratio(&input.model, input.aspect_ratio.unwrap_or(AspectRatio::Landscape)),
        });
        if let Some(seed) = &input.seed_image_url {
            body["promptImage"] = json!(seed);
        }
        if let Some(d) = input.duration_secs {
            body["duration"] = json!(d);
        }
        if let Some(seed) = input.extra.get("seed") {
            body["seed"] = seed.clone();
        }
        body
    }

    async fn poll_once(&self, id: &str) -> ProviderResult<PollStatus<RunwayTask>> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/v1/tasks/{id}"))
            .send()
            .await?;
        let task: RunwayTask = read_json(resp).await?;
        match task.status.as_str() {
            "SUCCEEDED" => Ok(PollStatus::Done(task)),
            "FAILED" => {
                let reason = task.failure.unwrap_or_else(|| "task failed".to_string());
                match task.failure_code.as_deref() {
                    // Runway reports capacity problems as failures.
                    Some(code) if code.starts_with("INTERNAL") => {
                        Err(ProviderError::transient(format!("{code}: {reason}")))
                    }
                    Some(code) => Err(ProviderError::failed(format!("{code}: {reason}"))),
                    None => Err(ProviderError::failed(reason)),
                }
            }
            "CANCELLED" => Err(ProviderError::ProviderCancelled),
            _ => Ok(PollStatus::Pending),
        }
    }
}

#[async_trait]
impl ProviderAdapter for RunwayAdapter {
    fn provider(&self) -> Provider {
        Provider::Runway
    }

    fn profile(&self) -> &PollingProfile {
        &self.config.profile
    }

    fn validate_input(&self, model: &str, raw: &InputParams) -> ProviderResult<ValidatedInput> {
        validate_for(ModelSpec::find(RUNWAY_MODELS, model)?, raw)
    }

    async fn generate(
        &self,
        input: &ValidatedInput,
        cancel: &CancellationToken,
    ) -> ProviderResult<OutputAsset> {
        let spec = ModelSpec::find(RUNWAY_MODELS, &input.model)?;
        let started = Instant::now();

        let resp = self
            .request(reqwest::Method::POST, "/v1/image_to_video")
            .json(&Self::build_body(input))
            .send()
            .await?;
        let created: CreatedTask = read_json(resp).await?;
        let remote_id = created.id;
        info!(provider = "runway", model = spec.name, remote_id = %remote_id, "Task created");

        let task = match poll_until(&self.config.profile, cancel, &remote_id, || {
            self.poll_once(&remote_id)
        })
        .await
        {
            Ok(t) => t,
            Err(ProviderError::ProviderCancelled) => {
                self.cancel(&remote_id).await;
                return Err(ProviderError::ProviderCancelled);
            }
            Err(e) => return Err(e),
        };

        let url = task
            .output
            .and_then(|o| o.into_iter().next())
            .ok_or_else(|| ProviderError::malformed("task succeeded without output"))?;

        let mut asset = OutputAsset::new(url.clone(), spec.kind)
            .with_mime_type(guess_mime(&url, spec.kind))
            .with_metadata(AssetMetadata {
                provider: Provider::Runway.as_str().to_string(),
                model: spec.name.to_string(),
                generation_time_secs: Some(started.elapsed().as_secs_f64()),
                remote_job_id: Some(remote_id),
                extra: Default::default(),
            });
        if let Some(d) = input.duration_secs {
            asset = asset.with_duration(d as f64);
        }
        Ok(asset)
    }

    async fn cancel(&self, remote_job_id: &str) -> bool {
        match self
            .request(reqwest::Method::DELETE, &format!("/v1/tasks/{remote_job_id}"))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(remote_id = remote_job_id, "Runway task cancelled");
                true
            }
            Ok(resp) => {
                warn!(remote_id = remote_job_id, status = %resp.status(), "Runway cancel rejected");
                false
            }
            Err(e) => {
                warn!(remote_id = remote_job_id, "Runway cancel failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn raw(v: Value) -> InputParams {
        v.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn adapter(server: &MockServer) -> RunwayAdapter {
        RunwayAdapter::new(
            RunwayConfig::new("key_test")
                .with_base_url(server.uri())
                .with_profile(PollingProfile::new(
                    Duration::from_millis(10),
                    Duration::from_secs(1),
                    Duration::from_secs(2),
                )),
        )
        .unwrap()
    }

    #[test]
    fn test_seed_image_required() {
        let adapter = RunwayAdapter::new(RunwayConfig::new("k")).unwrap();
        let err = adapter
            .validate_input("gen4_turbo", &raw(json!({"prompt": "waves"})))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_generate_sends_versioned_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/image_to_video"))
            .and(header("X-Runway-Version", API_VERSION))
            .and(body_partial_json(json!({
                "model": "gen4_turbo",
                "ratio": "720:1280",
                "promptImage": "https://img.example.com/seed.png",
                "duration": 8
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rw-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/rw-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "rw-1",
                "status": "SUCCEEDED",
                "output": ["https://dnznrvs05pmza.cloudfront.net/rw-1.mp4"]
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server).await;
        let input = adapter
            .validate_input(
                "gen4_turbo",
                &raw(json!({
                    "prompt": "waves at dusk",
                    "duration": 8,
                    "aspect_ratio": "9:16",
                    "seed_image_url": "https://img.example.com/seed.png"
                })),
            )
            .unwrap();
        let asset = adapter.generate(&input, &CancellationToken::new()).await.unwrap();
        assert!(asset.url.ends_with("rw-1.mp4"));
        assert_eq!(asset.duration_secs, Some(8.0));
        assert_eq!(asset.metadata.provider, "runway");
    }

    #[tokio::test]
    async fn test_failure_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "a", "status": "FAILED", "failure": "moderation", "failureCode": "SAFETY.INPUT.TEXT"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "b", "status": "FAILED", "failure": "busy", "failureCode": "INTERNAL.BAD_OUTPUT"
            })))
            .mount(&server)
            .await;

        let adapter = adapter(&server).await;
        assert!(!adapter.poll_once("a").await.unwrap_err().is_retryable());
        assert!(adapter.poll_once("b").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_uses_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/tasks/rw-9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(adapter(&server).await.cancel("rw-9").await);
    }
}
