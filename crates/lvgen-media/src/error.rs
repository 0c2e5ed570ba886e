//! Post-processing errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    /// `ffmpeg` or `ffprobe` is not on PATH.
    #[error("{0} not found in PATH")]
    ToolMissing(&'static str),

    #[error("ffmpeg {stage} failed (exit {exit_code:?})")]
    Ffmpeg {
        stage: String,
        /// Last lines of stderr, when any were captured.
        stderr_tail: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe could not read {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("fetching segment asset failed: {0}")]
    Fetch(String),

    #[error("missing input {0}")]
    MissingInput(PathBuf),

    #[error("no segment videos to combine")]
    NothingToCombine,

    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unreadable probe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    Worker(String),
}

impl MediaError {
    pub fn ffmpeg(stage: impl Into<String>, stderr_tail: Option<String>, exit_code: Option<i32>) -> Self {
        Self::Ffmpeg {
            stage: stage.into(),
            stderr_tail,
            exit_code,
        }
    }

    pub fn fetch(reason: impl ToString) -> Self {
        Self::Fetch(reason.to_string())
    }

    pub fn worker(reason: impl ToString) -> Self {
        Self::Worker(reason.to_string())
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        Self::fetch(e)
    }
}
