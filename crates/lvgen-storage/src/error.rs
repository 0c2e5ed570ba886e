//! Blob mirror errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

/// Failures carry the object key they concern so callers can log it without
/// threading the key through separately.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob mirror not configured: {0} is unset")]
    MissingConfig(String),

    #[error("could not mirror {key}: {reason}")]
    Upload { key: String, reason: String },

    #[error("could not sign a URL for {key}: {reason}")]
    Presign { key: String, reason: String },

    #[error("bucket {bucket} unreachable: {reason}")]
    Bucket { bucket: String, reason: String },
}

impl StorageError {
    pub fn upload(key: &str, reason: impl ToString) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn presign(key: &str, reason: impl ToString) -> Self {
        Self::Presign {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn bucket(bucket: &str, reason: impl ToString) -> Self {
        Self::Bucket {
            bucket: bucket.to_string(),
            reason: reason.to_string(),
        }
    }

    /// A missing variable will not appear on retry; everything else is a
    /// network round trip that might.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::MissingConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = StorageError::upload("tasks/u1/t1/combined.mp4", "timed out");
        assert_eq!(err.to_string(), "could not mirror tasks/u1/t1/combined.mp4: timed out");
        assert!(err.is_transient());
        assert!(!StorageError::MissingConfig("R2_BUCKET_NAME".into()).is_transient());
    }
}
