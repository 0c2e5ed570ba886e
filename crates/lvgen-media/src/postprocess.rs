//! Post-processing of generated assets.
//!
//! Everything here is best effort: a failed download or thumbnail is logged
//! and reported as missing local paths, never as a failed generation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lvgen_models::{LocalPaths, MediaKind, OutputAsset, TaskId};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::FfmpegRunner;
use crate::concat::concat_segments;
use crate::download::download_to_file;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaInfo};
use crate::thumbnail::{image_thumbnail, video_thumbnail};

/// Media configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cache_dir: PathBuf,
    pub download_timeout: Duration,
    pub ffmpeg_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("lvgen-cache"),
            download_timeout: Duration::from_secs(300),
            ffmpeg_timeout: Duration::from_secs(600),
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        Self {
            cache_dir: std::env::var("WORKER_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            download_timeout: secs("MEDIA_DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout),
            ffmpeg_timeout: secs("MEDIA_FFMPEG_TIMEOUT_SECS", defaults.ffmpeg_timeout),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

/// Where in a task's cache directory an asset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSlot {
    /// Output of a single-shot task
    Primary,
    Segment(u32),
    /// Concatenation of all segments
    Combined,
}

pub struct MediaPostProcessor {
    client: reqwest::Client,
    config: MediaConfig,
}

impl MediaPostProcessor {
    pub fn new(config: MediaConfig) -> MediaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| MediaError::worker(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn task_dir(&self, task_id: &TaskId) -> PathBuf {
        self.config.cache_dir.join(task_id.as_str())
    }

    pub fn asset_path(&self, task_id: &TaskId, slot: AssetSlot, kind: MediaKind) -> PathBuf {
        let dir = self.task_dir(task_id);
        match slot {
            AssetSlot::Primary => dir.join(format!("output.{}", kind.default_extension())),
            AssetSlot::Segment(i) => dir
                .join("segments")
                .join(format!("{:03}.{}", i, kind.default_extension())),
            AssetSlot::Combined => dir.join("combined.mp4"),
        }
    }

    pub fn thumbnail_path(&self, task_id: &TaskId, slot: AssetSlot) -> PathBuf {
        let dir = self.task_dir(task_id);
        match slot {
            AssetSlot::Segment(i) => dir.join("segments").join(format!("{:03}.jpg", i)),
            AssetSlot::Primary | AssetSlot::Combined => dir.join("thumbnail.jpg"),
        }
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout)
    }

    /// Download `asset` into the cache and derive a thumbnail when the kind
    /// allows it. Failures yield empty paths.
    pub async fn fetch_and_store(
        &self,
        task_id: &TaskId,
        asset: &OutputAsset,
        slot: AssetSlot,
    ) -> LocalPaths {
        let dest = self.asset_path(task_id, slot, asset.kind);
        if let Err(e) = download_to_file(&self.client, &asset.url, &dest).await {
            warn!(task_id = %task_id, url = %asset.url, "Asset download failed: {}", e);
            return LocalPaths::default();
        }

        let mut paths = LocalPaths::default();
        let local = Some(dest.to_string_lossy().to_string());
        match asset.kind {
            MediaKind::Video => paths.video_path = local,
            MediaKind::Image => paths.image_path = local,
            _ => {}
        }

        if asset.kind.has_thumbnail() {
            let thumb = self.thumbnail_path(task_id, slot);
            let result = match asset.kind {
                MediaKind::Video => video_thumbnail(&dest, &thumb, &self.runner()).await,
                _ => image_thumbnail(&dest, &thumb).await,
            };
            match result {
                Ok(()) => paths.thumbnail_path = Some(thumb.to_string_lossy().to_string()),
                Err(e) => warn!(task_id = %task_id, "Thumbnail generation failed: {}", e),
            }
        }

        paths
    }

    /// Local copy of a segment, downloading it again if the cached file is
    /// missing.
    pub async fn ensure_segment_file(
        &self,
        task_id: &TaskId,
        index: u32,
        asset: &OutputAsset,
    ) -> MediaResult<PathBuf> {
        let path = self.asset_path(task_id, AssetSlot::Segment(index), asset.kind);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }
        download_to_file(&self.client, &asset.url, &path).await?;
        Ok(path)
    }

    /// Concatenate ordered segment files into the task's combined video.
    pub async fn combine_segments(
        &self,
        task_id: &TaskId,
        ordered: &[PathBuf],
        cancel: &CancellationToken,
    ) -> MediaResult<LocalPaths> {
        let output = self.asset_path(task_id, AssetSlot::Combined, MediaKind::Video);
        let runner = self.runner().with_cancel(cancel.clone());
        concat_segments(ordered, &output, &runner).await?;

        let mut paths = LocalPaths {
            video_path: Some(output.to_string_lossy().to_string()),
            ..Default::default()
        };
        let thumb = self.thumbnail_path(task_id, AssetSlot::Combined);
        match video_thumbnail(&output, &thumb, &runner).await {
            Ok(()) => paths.thumbnail_path = Some(thumb.to_string_lossy().to_string()),
            Err(e) => warn!(task_id = %task_id, "Combined thumbnail failed: {}", e),
        }

        info!(task_id = %task_id, segments = ordered.len(), "Combined video ready");
        Ok(paths)
    }

    /// Probe a cached file; unknown fields stay empty when probing fails.
    pub async fn describe(&self, path: &Path) -> MediaInfo {
        match probe_media(path).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Probe of {} failed: {}", path.display(), e);
                MediaInfo {
                    size: std::fs::metadata(path).ok().map(|m| m.len()),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn processor(dir: &Path) -> MediaPostProcessor {
        MediaPostProcessor::new(MediaConfig::default().with_cache_dir(dir)).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(800, 1200, Rgb([200, 0, 0]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_cache_layout() {
        let p = processor(Path::new("/cache"));
        let task = TaskId::from_string("t1");
        assert_eq!(
            p.asset_path(&task, AssetSlot::Segment(3), MediaKind::Video),
            PathBuf::from("/cache/t1/segments/003.mp4")
        );
        assert_eq!(
            p.thumbnail_path(&task, AssetSlot::Combined),
            PathBuf::from("/cache/t1/thumbnail.jpg")
        );
    }

    #[tokio::test]
    async fn test_image_asset_cached_with_thumbnail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = processor(dir.path());
        let task = TaskId::from_string("t-img");
        let asset = OutputAsset::new(format!("{}/img.png", server.uri()), MediaKind::Image);

        let paths = p.fetch_and_store(&task, &asset, AssetSlot::Primary).await;
        assert!(paths.image_path.as_deref().unwrap().ends_with("output.png"));
        let thumb = paths.thumbnail_path.unwrap();
        let (w, h) = image::image_dimensions(&thumb).unwrap();
        assert_eq!((w, h), (320, 480));
    }

    #[tokio::test]
    async fn test_failed_download_degrades_to_empty_paths() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = processor(dir.path());
        let asset = OutputAsset::new(format!("{}/v.mp4", server.uri()), MediaKind::Video);
        let paths = p
            .fetch_and_store(&TaskId::from_string("t"), &asset, AssetSlot::Segment(0))
            .await;
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_segment_file_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let p = processor(dir.path());
        let task = TaskId::from_string("t");
        let cached = p.asset_path(&task, AssetSlot::Segment(1), MediaKind::Video);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"data").unwrap();

        // URL is unreachable; the cached file must be used.
        let asset = OutputAsset::new("http://127.0.0.1:9/none.mp4", MediaKind::Video);
        let path = p.ensure_segment_file(&task, 1, &asset).await.unwrap();
        assert_eq!(path, cached);
    }
}
