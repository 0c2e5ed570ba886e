//! Input validation shared by all adapters.
//!
//! Raw task input is an opaque map. It is first decoded into
//! [`RawGenerationInput`] and checked against the bounds every backend
//! shares, then narrowed by the [`ModelSpec`] of the selected model.

use std::collections::BTreeMap;

use lvgen_models::{InputParams, MediaKind};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "3:4")]
    ClassicPortrait,
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Classic => "4:3",
            AspectRatio::ClassicPortrait => "3:4",
            AspectRatio::Ultrawide => "21:9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyFilter {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
}

impl SafetyFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyFilter::BlockLowAndAbove => "block_low_and_above",
            SafetyFilter::BlockMediumAndAbove => "block_medium_and_above",
            SafetyFilter::BlockOnlyHigh => "block_only_high",
        }
    }
}

/// Accepted durations for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationRule {
    /// Duration is not a parameter of this model
    Ignored,
    Range { min: u32, max: u32 },
    OneOf(&'static [u32]),
}

impl DurationRule {
    fn check(&self, secs: u32) -> bool {
        match self {
            DurationRule::Ignored => true,
            DurationRule::Range { min, max } => (*min..=*max).contains(&secs),
            DurationRule::OneOf(allowed) => allowed.contains(&secs),
        }
    }
}

/// Schema of one model exposed by a provider.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    /// Service name as it appears in the catalog
    pub name: &'static str,
    /// Backend-side identifier
    pub remote_id: &'static str,
    pub kind: MediaKind,
    pub max_prompt_chars: usize,
    pub durations: DurationRule,
    /// Empty means any ratio
    pub aspect_ratios: &'static [AspectRatio],
    pub requires_seed_image: bool,
}

impl ModelSpec {
    pub fn find<'a>(specs: &'a [ModelSpec], name: &str) -> ProviderResult<&'a ModelSpec> {
        specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ProviderError::invalid_input(format!("unsupported model: {name}")))
    }
}

/// Fields every backend understands; anything else is kept in `extra`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RawGenerationInput {
    #[validate(length(min = 1, max = 4000, message = "prompt must be 1-4000 characters"))]
    pub prompt: String,

    #[validate(range(min = 1, max = 60, message = "duration must be 1-60 seconds"))]
    #[serde(default)]
    pub duration: Option<u32>,

    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,

    #[serde(default)]
    pub resolution: Option<String>,

    #[validate(url(message = "seed_image_url must be a valid URL"))]
    #[serde(default)]
    pub seed_image_url: Option<String>,

    #[serde(default)]
    pub safety_filter: Option<SafetyFilter>,

    /// Remote id of a previous generation to continue from
    #[serde(default)]
    pub continuation_of: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Input that passed both the shared and the model-specific checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub model: String,
    pub kind: MediaKind,
    pub prompt: String,
    pub duration_secs: Option<u32>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<String>,
    pub seed_image_url: Option<String>,
    pub safety_filter: Option<SafetyFilter>,
    pub continuation_of: Option<String>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Decode `raw` and check it against `spec`.
pub fn validate_for(spec: &ModelSpec, raw: &InputParams) -> ProviderResult<ValidatedInput> {
    let object: serde_json::Map<String, serde_json::Value> =
        raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let input: RawGenerationInput = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| ProviderError::invalid_input(e.to_string()))?;

    input
        .validate()
        .map_err(|e| ProviderError::invalid_input(e.to_string()))?;

    if input.prompt.trim().is_empty() {
        return Err(ProviderError::invalid_input("prompt must not be blank"));
    }
    if input.prompt.chars().count() > spec.max_prompt_chars {
        return Err(ProviderError::invalid_input(format!(
            "prompt exceeds {} characters for {}",
            spec.max_prompt_chars, spec.name
        )));
    }

    let duration_secs = match (spec.durations, input.duration) {
        (DurationRule::Ignored, _) => None,
        (rule, Some(secs)) if !rule.check(secs) => {
            return Err(ProviderError::invalid_input(format!(
                "duration {secs}s not supported by {}",
                spec.name
            )));
        }
        (_, duration) => duration,
    };

    if let Some(ratio) = input.aspect_ratio {
        if !spec.aspect_ratios.is_empty() && !spec.aspect_ratios.contains(&ratio) {
            return Err(ProviderError::invalid_input(format!(
                "aspect ratio {} not supported by {}",
                ratio.as_str(),
                spec.name
            )));
        }
    }

    if spec.requires_seed_image && input.seed_image_url.is_none() {
        return Err(ProviderError::invalid_input(format!(
            "{} requires seed_image_url",
            spec.name
        )));
    }

    Ok(ValidatedInput {
        model: spec.name.to_string(),
        kind: spec.kind,
        prompt: input.prompt,
        duration_secs,
        aspect_ratio: input.aspect_ratio,
        resolution: input.resolution,
        seed_image_url: input.seed_image_url,
        safety_filter: input.safety_filter,
        continuation_of: input.continuation_of,
        extra: input.extra,
    })
}

/// Content type to report for a downloaded asset.
pub(crate) fn guess_mime(url: &str, kind: MediaKind) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mp4") => "video/mp4",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        _ => match kind {
            MediaKind::Image => "image/png",
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Text => "text/plain",
            MediaKind::Model3d => "model/gltf-binary",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC: ModelSpec = ModelSpec {
        name: "test-video",
        remote_id: "acme/test-video",
        kind: MediaKind::Video,
        max_prompt_chars: 20,
        durations: DurationRule::Range { min: 4, max: 10 },
        aspect_ratios: &[AspectRatio::Landscape, AspectRatio::Portrait],
        requires_seed_image: false,
    };

    fn params(v: serde_json::Value) -> InputParams {
        v.as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn test_valid_input_keeps_extras() {
        let input = validate_for(
            &SPEC,
            &params(json!({"prompt": "a cat", "duration": 8, "aspect_ratio": "9:16", "motion": 3})),
        )
        .unwrap();
        assert_eq!(input.duration_secs, Some(8));
        assert_eq!(input.aspect_ratio, Some(AspectRatio::Portrait));
        assert_eq!(input.extra.get("motion"), Some(&json!(3)));
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!({"duration": 8}),
            json!({"prompt": ""}),
            json!({"prompt": "   "}),
            json!({"prompt": "a very long prompt over twenty chars"}),
            json!({"prompt": "a", "duration": 12}),
            json!({"prompt": "a", "aspect_ratio": "1:1"}),
            json!({"prompt": "a", "aspect_ratio": "5:4"}),
            json!({"prompt": "a", "seed_image_url": "not a url"}),
        ];
        for case in cases {
            let err = validate_for(&SPEC, &params(case.clone())).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidInput(_)), "{case}");
        }
    }

    #[test]
    fn test_seed_required() {
        let spec = ModelSpec {
            requires_seed_image: true,
            ..SPEC
        };
        let err = validate_for(&spec, &params(json!({"prompt": "a"}))).unwrap_err();
        assert!(err.to_string().contains("seed_image_url"));
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("https://x/a.webp?sig=1", MediaKind::Image), "image/webp");
        assert_eq!(guess_mime("https://x/blob", MediaKind::Video), "video/mp4");
    }
}
