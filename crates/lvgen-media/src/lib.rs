//! Media post-processing.
//!
//! This crate provides:
//! - An FFmpeg command builder and a cancellable runner
//! - Streaming download of provider outputs into a local cache
//! - Thumbnails for videos (FFmpeg) and images (`image`)
//! - Stream-copy concatenation of ordered segment files
//! - [`MediaPostProcessor`], which ties these together and degrades
//!   gracefully when any step fails

pub mod command;
pub mod concat;
pub mod download;
pub mod error;
pub mod postprocess;
pub mod probe;
pub mod thumbnail;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{concat_list, concat_segments};
pub use download::download_to_file;
pub use error::{MediaError, MediaResult};
pub use postprocess::{AssetSlot, MediaConfig, MediaPostProcessor};
pub use probe::{probe_media, MediaInfo};
pub use thumbnail::{image_thumbnail, video_thumbnail, THUMBNAIL_MAX_DIMENSION, THUMBNAIL_TIMESTAMP};
