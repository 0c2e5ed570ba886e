//! Output assets produced by provider backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of media a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Text,
    #[serde(rename = "3d-model")]
    Model3d,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Text => "text",
            MediaKind::Model3d => "3d-model",
        }
    }

    /// File extension used when caching an asset of this kind.
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
            MediaKind::Text => "txt",
            MediaKind::Model3d => "glb",
        }
    }

    /// Whether a thumbnail can be derived from this kind.
    pub fn has_thumbnail(&self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Video)
    }
}

/// Provenance of an output asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssetMetadata {
    pub provider: String,

    pub model: String,

    /// Wall-clock seconds the remote generation took
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_time_secs: Option<f64>,

    /// Job id on the provider side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_job_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A generated artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputAsset {
    pub url: String,

    pub kind: MediaKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub metadata: AssetMetadata,
}

impl OutputAsset {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
            mime_type: None,
            size_bytes: None,
            width: None,
            height: None,
            duration_secs: None,
            created_at: Utc::now(),
            metadata: AssetMetadata::default(),
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Local cache locations for a task's primary artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LocalPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
}

impl LocalPaths {
    pub fn is_empty(&self) -> bool {
        self.video_path.is_none() && self.image_path.is_none() && self.thumbnail_path.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_serde() {
        assert_eq!(serde_json::to_string(&MediaKind::Model3d).unwrap(), "\"3d-model\"");
        let kind: MediaKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(kind, MediaKind::Video);
        assert!(kind.has_thumbnail());
        assert!(!MediaKind::Audio.has_thumbnail());
    }

    #[test]
    fn test_output_asset_builder() {
        let asset = OutputAsset::new("https://cdn/x.mp4", MediaKind::Video)
            .with_mime_type("video/mp4")
            .with_dimensions(1280, 720)
            .with_duration(8.0);
        assert_eq!(asset.width, Some(1280));
        assert_eq!(asset.duration_secs, Some(8.0));

        let json = serde_json::to_value(&asset).unwrap();
        assert!(json.get("size_bytes").is_none());
    }
}
