//! Replicate predictions API.

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

pub const REPLICATE_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "minimax-video-01",
        remote_id: "minimax/video-01",
        kind: MediaKind::Video,
        max_prompt_chars: 2000,
        durations: DurationRule::Range { min: 1, max: 10 },
        aspect_ratios: &[],
        requires_seed_image: false,
    },
    ModelSpec {
        name: "kling-v1.6-standard",
        remote_id: "kwaivgi/kling-v1.6-standard",
        kind: MediaKind::Video,
        max_prompt_chars: 2500,
        durations: DurationRule::Range { min: 5, max: 10 },
        aspect_ratios: &[AspectRatio::Landscape, AspectRatio::Portrait, AspectRatio::Square],
        requires_seed_image: false,
    },
    ModelSpec {
        name: "flux-schnell",
        remote_id: "black-forest-labs/flux-schnell",
        kind: MediaKind::Image,
        max_prompt_chars: 2000,
        durations: DurationRule::Ignored,
        aspect_ratios: &[],
        requires_seed_image: false,
    },
    ModelSpec {
        name: "musicgen",
        remote_id: "meta/musicgen",
        kind: MediaKind::Audio,
        max_prompt_chars: 1000,
        durations: DurationRule::Range { min: 1, max: 30 },
        aspect_ratios: &[],
        requires_seed_image: false,
    },
];

/// Replicate configuration.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub profile: PollingProfile,
}

impl ReplicateConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: "https://api.replicate.com".to_string(),
            request_timeout: Duration::from_secs(30),
            profile: PollingProfile::new(
                Duration::from_secs(5),
                Duration::from_secs(10 * 60),
                Duration::from_secs(15 * 60),
            ),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let token = std::env::var("REPLICATE_API_TOKEN")
            .map_err(|_| ProviderError::config("REPLICATE_API_TOKEN not set"))?;
        let mut config = Self::new(token);
        if let Ok(url) = std::env::var("REPLICATE_BASE_URL") {
            config.base_url = url;
        }
        config.request_timeout = env_duration_secs("REPLICATE_TIMEOUT_SECS", 30);
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
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    metrics: Option<PredictionMetrics>,
}

#[derive(Debug, Deserialize)]
struct PredictionMetrics {
    #[serde(default)]
    predict_time: Option<f64>,
}

/// First URL in a prediction output (string, list of strings, or `{url}`).
fn first_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_url),
        Value::Object(map) => map.get("url").and_then(first_url),
        _ => None,
    }
}

fn seed_param(model: &str) -> &'static str {
    match model {
        "minimax-video-01" => "first_frame_image",
        "kling-v1.6-standard" => "start_image",
        _ => "image",
    }
}

pub struct ReplicateAdapter {
    client: Client,
    config: ReplicateConfig,
}

impl ReplicateAdapter {
    pub fn new(config: ReplicateConfig) -> ProviderResult<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ReplicateConfig::from_env()?)
    }

    fn build_input(input: &ValidatedInput) -> Value {
        let mut body = serde_json::Map::new();
        for (k, v) in &input.extra {
            body.insert(k.clone(), v.clone());
        }
        body.insert("prompt".into(), json!(input.prompt));
        if let Some(d) = input.duration_secs {
            body.insert("duration".into(), json!(d));
        }
        if let Some(ratio) = input.aspect_ratio {
            body.insert("aspect_ratio".into(), json!(ratio.as_str()));
        }
        if let Some(seed) = &input.seed_image_url {
            body.insert(seed_param(&input.model).into(), json!(seed));
        }
        if let Some(filter) = input.safety_filter {
            body.insert("safety_filter".into(), json!(filter.as_str()));
        }
        Value::Object(body)
    }

    async fn create(&self, spec: &ModelSpec, input: &ValidatedInput) -> ProviderResult<Prediction> {
        let url = format!(
            "{}/v1/models/{}/predictions",
            self.config.base_url, spec.remote_id
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&json!({ "input": Self::build_input(input) }))
            .send()
            .await?;
        read_json(resp).await
    }

    async fn fetch(&self, id: &str) -> ProviderResult<Prediction> {
        let url = format!("{}/v1/predictions/{}", self.config.base_url, id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn poll_once(&self, id: &str) -> ProviderResult<PollStatus<Prediction>> {
        let prediction = self.fetch(id).await?;
        match prediction.status.as_str() {
            "succeeded" => Ok(PollStatus::Done(prediction)),
            "failed" => Err(ProviderError::failed(
                prediction
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "prediction failed".to_string()),
            )),
            "canceled" => Err(ProviderError::ProviderCancelled),
            _ => Ok(PollStatus::Pending),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ReplicateAdapter {
    fn provider(&self) -> Provider {
        Provider::Replicate
    }

    fn profile(&self) -> &PollingProfile {
        &self.config.profile
    }

    fn validate_input(&self, model: &str, raw: &InputParams) -> ProviderResult<ValidatedInput> {
        validate_for(ModelSpec::find(REPLICATE_MODELS, model)?, raw)
    }

    async fn generate(
        &self,
        input: &ValidatedInput,
        cancel: &CancellationToken,
    ) -> ProviderResult<OutputAsset> {
        let spec = ModelSpec::find(REPLICATE_MODELS, &input.model)?;
        let started = Instant::now();

        let created = self.create(spec, input).await?;
        let remote_id = created.id.clone();
        info!(provider = "replicate", model = spec.name, remote_id = %remote_id, "Prediction created");

        let prediction = match poll_until(&self.config.profile, cancel, &remote_id, || {
            self.poll_once(&remote_id)
        })
        .await
        {
            Ok(p) => p,
            Err(ProviderError::ProviderCancelled) => {
                self.cancel(&remote_id).await;
                return Err(ProviderError::ProviderCancelled);
            }
            Err(e) => return Err(e),
        };

        let url = prediction
            .output
            .as_ref()
            .and_then(first_url)
            .ok_or_else(|| ProviderError::malformed("prediction succeeded without output"))?;

        let generation_time = prediction
            .metrics
            .and_then(|m| m.predict_time)
            .unwrap_or_else(|| started.elapsed().as_secs_f64());

        let mut asset = OutputAsset::new(url.clone(), spec.kind)
            .with_mime_type(guess_mime(&url, spec.kind))
            .with_metadata(AssetMetadata {
                provider: Provider::Replicate.as_str().to_string(),
                model: spec.name.to_string(),
                generation_time_secs: Some(generation_time),
                remote_job_id: Some(remote_id),
                extra: Default::default(),
            });
        if let Some(d) = input.duration_secs.filter(|_| spec.kind == MediaKind::Video) {
            asset = asset.with_duration(d as f64);
        }
        Ok(asset)
    }

    async fn cancel(&self, remote_job_id: &str) -> bool {
        let url = format!(
            "{}/v1/predictions/{}/cancel",
            self.config.base_url, remote_job_id
        );
        match self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(remote_id = remote_job_id, "Replicate prediction cancelled");
                true
            }
            Ok(resp) => {
                warn!(remote_id = remote_job_id, status = %resp.status(), "Replicate cancel rejected");
                false
            }
            Err(e) => {
                warn!(remote_id = remote_job_id, "Replicate cancel failed: {}", e);
                false
            }
        }
    }
}
