//! Thumbnail generation.

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Frame used for video thumbnails.
pub const THUMBNAIL_TIMESTAMP: &str = "00:00:01";

/// Longest edge of a thumbnail in pixels.
pub const THUMBNAIL_MAX_DIMENSION: u32 = 480;

fn scale_filter() -> String {
    format!(
        "scale=w={0}:h={0}:force_original_aspect_ratio=decrease",
        THUMBNAIL_MAX_DIMENSION
    )
}

fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Grab a frame at one second, falling back to the first frame for clips
/// shorter than that.
pub async fn video_thumbnail(
    video_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let video_path = video_path.as_ref();
    let output_path = output_path.as_ref();

    let at_one_second = FfmpegCommand::new(video_path, output_path)
        .seek_to(THUMBNAIL_TIMESTAMP)
        .single_frame()
        .video_filter(scale_filter());

    match runner.run(&at_one_second).await {
        Ok(()) if non_empty(output_path) => return Ok(()),
        Ok(()) => debug!("No frame at {}, using first frame", THUMBNAIL_TIMESTAMP),
        Err(MediaError::Ffmpeg { .. }) => {
            debug!("Seek thumbnail failed, using first frame")
        }
        Err(e) => return Err(e),
    }

    let first_frame = FfmpegCommand::new(video_path, output_path)
        .single_frame()
        .video_filter(scale_filter());
    runner.run(&first_frame).await?;

    if non_empty(output_path) {
        Ok(())
    } else {
        Err(MediaError::ffmpeg("thumbnail", None, None))
    }
}

/// Downscale an image to fit the thumbnail box, keeping its aspect ratio.
pub async fn image_thumbnail(
    image_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let src = image_path.as_ref().to_path_buf();
    let dst = output_path.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> MediaResult<()> {
        let img = image::open(&src)?;
        let thumb = img.thumbnail(THUMBNAIL_MAX_DIMENSION, THUMBNAIL_MAX_DIMENSION);
        // JPEG has no alpha channel.
        DynamicImage::ImageRgb8(thumb.to_rgb8()).save(&dst)?;
        Ok(())
    })
    .await
    .map_err(|e| MediaError::worker(format!("thumbnail task failed: {e}")))?
}
