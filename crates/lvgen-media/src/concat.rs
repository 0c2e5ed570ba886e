//! Segment concatenation with the FFmpeg concat demuxer.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Render a concat demuxer list for `paths` in the given order.
pub fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Stream-copy `paths` (already in playback order) into `output`.
pub async fn concat_segments(
    paths: &[PathBuf],
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let output = output.as_ref();
    if paths.is_empty() {
        return Err(MediaError::NothingToCombine);
    }
    for p in paths {
        if !p.exists() {
            return Err(MediaError::MissingInput(p.clone()));
        }
    }
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let list_path = output.with_extension("concat.txt");
    tokio::fs::write(&list_path, concat_list(paths)).await?;

    let cmd = FfmpegCommand::new(&list_path, output)
        .input_format("concat")
        .input_args(["-safe", "0"])
        .stream_copy()
        .output_arg("-movflags")
        .output_arg("+faststart");

    let result = runner.run(&cmd).await;
    let _ = tokio::fs::remove_file(&list_path).await;
    result?;

    info!(segments = paths.len(), "Combined segments into {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_escapes_quotes_and_keeps_order() {
        let list = concat_list(&[
            PathBuf::from("/cache/t/segments/000.mp4"),
            PathBuf::from("/cache/it's/001.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/cache/t/segments/000.mp4'\nfile '/cache/it'\\''s/001.mp4'\n"
        );
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let err = concat_segments(&[], "/tmp/out.mp4", &FfmpegRunner::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NothingToCombine));
    }

    #[tokio::test]
    async fn test_missing_segment_rejected_before_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("000.mp4");
        let err = concat_segments(&[missing.clone()], dir.path().join("out.mp4"), &FfmpegRunner::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingInput(p) if p == missing));
    }
}
