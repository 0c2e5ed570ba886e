//! Luma Dream Machine generations API.
//!
//! Luma has no cancel endpoint; a cancelled generation is abandoned and
//! left to finish on the remote side.

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
use crate::input::{guess_mime, validate_for, DurationRule, ModelSpec, ValidatedInput};
use crate::polling::{poll_until, PollStatus, PollingProfile};

pub const LUMA_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "ray-2",
        remote_id: "ray-2",
        kind: MediaKind::Video,
        max_prompt_chars: 5000,
        durations: DurationRule::Range { min: 5, max: 10 },
        aspect_ratios: &[],
        requires_seed_image: false,
    },
    ModelSpec {
        name: "ray-flash-2",
        remote_id: "ray-flash-2",
        kind: MediaKind::Video,
        max_prompt_chars: 5000,
        durations: DurationRule::Range { min: 5, max: 10 },
        aspect_ratios: &[],
        requires_seed_image: false,
    },
];

/// Luma configuration.
#[derive(Debug, Clone)]
pub struct LumaConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub profile: PollingProfile,
}

impl LumaConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.lumalabs.ai".to_string(),
            request_timeout: Duration::from_secs(30),
            profile: PollingProfile::new(
                Duration::from_secs(15),
                Duration::from_secs(45 * 60),
                Duration::from_secs(70 * 60),
            ),
        }
    }

    pub fn from_env() -> ProviderResult<Self> {
        let key = std::env::var("LUMA_API_KEY")
            .map_err(|_| ProviderError::config("LUMA_API_KEY not set"))?;
        let mut config = Self::new(key);
        if let Ok(url) = std::env::var("LUMA_BASE_URL") {
            config.base_url = url;
        }
        config.request_timeout = env_duration_secs("LUMA_TIMEOUT_SECS", 30);
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
struct Generation {
    id: String,
    state: String,
    #[serde(default)]
    failure_reason: Option<String>,
    #[serde(default)]
    assets: Option<GenerationAssets>,
}

#[derive(Debug, Deserialize)]
struct GenerationAssets {
    #[serde(default)]
    video: Option<String>,
}

pub struct LumaAdapter {
    client: Client,
    config: LumaConfig,
}

impl LumaAdapter {
    pub fn new(config: LumaConfig) -> ProviderResult<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(LumaConfig::from_env()?)
    }

    fn build_body(input: &ValidatedInput) -> Value {
        let mut body = json!({
            "prompt": input.prompt,
            "model": input.model,
        });
        if let Some(ratio) = input.aspect_ratio {
            body["aspect_ratio"] = json!(ratio.as_str());
        }
        if let Some(d) = input.duration_secs {
            body["duration"] = json!(format!("{d}s"));
        }
        if let Some(res) = &input.resolution {
            body["resolution"] = json!(res);
        }
        // Continuing a previous generation takes precedence over a seed image.
        if let Some(previous) = &input.continuation_of {
            body["keyframes"] = json!({"frame0": {"type": "generation", "id": previous}});
        } else if let Some(seed) = &input.seed_image_url {
            body["keyframes"] = json!({"frame0": {"type": "image", "url": seed}});
        }
        if let Some(Value::Bool(looping)) = input.extra.get("loop") {
            body["loop"] = json!(looping);
        }
        body
    }

    async fn poll_once(&self, id: &str) -> ProviderResult<PollStatus<Generation>> {
        let resp = self
            .client
            .get(format!(
                "{}/dream-machine/v1/generations/{}",
                self.config.base_url, id
            ))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        let generation: Generation = read_json(resp).await?;
        match generation.state.as_str() {
            "completed" => Ok(PollStatus::Done(generation)),
            "failed" => Err(ProviderError::failed(
                generation
                    .failure_reason
                    .unwrap_or_else(|| "generation failed".to_string()),
            )),
            _ => Ok(PollStatus::Pending),
        }
    }
}

#[async_trait]
impl ProviderAdapter for LumaAdapter {
    fn provider(&self) -> Provider {
        Provider::Luma
    }

    fn profile(&self) -> &PollingProfile {
        &self.config.profile
    }

    fn validate_input(&self, model: &str, raw: &InputParams) -> ProviderResult<ValidatedInput> {
        validate_for(ModelSpec::find(LUMA_MODELS, model)?, raw)
    }

    async fn generate(
        &self,
        input: &ValidatedInput,
        cancel: &CancellationToken,
    ) -> ProviderResult<OutputAsset> {
        let spec = ModelSpec::find(LUMA_MODELS, &input.model)?;
        let started = Instant::now();

        let resp = self
            .client
            .post(format!("{}/dream-machine/v1/generations", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&Self::build_body(input))
            .send()
            .await?;
        let created: Generation = read_json(resp).await?;
        let remote_id = created.id;
        info!(provider = "luma", model = spec.name, remote_id = %remote_id, "Generation created");

        let generation = match poll_until(&self.config.profile, cancel, &remote_id, || {
            self.poll_once(&remote_id)
        })
        .await
        {
            Ok(g) => g,
            Err(ProviderError::ProviderCancelled) => {
                self.cancel(&remote_id).await;
                return Err(ProviderError::ProviderCancelled);
            }
            Err(e) => return Err(e),
        };

        let url = generation
            .assets
            .and_then(|a| a.video)
            .ok_or_else(|| ProviderError::malformed("generation completed without video"))?;

        let mut asset = OutputAsset::new(url.clone(), spec.kind)
            .with_mime_type(guess_mime(&url, spec.kind))
            .with_metadata(AssetMetadata {
                provider: Provider::Luma.as_str().to_string(),
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
        warn!(remote_id = remote_job_id, "Luma does not support cancellation; abandoning generation");
        false
    }
}
