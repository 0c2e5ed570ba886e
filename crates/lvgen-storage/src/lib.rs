//! S3-compatible blob mirror (Cloudflare R2).
//!
//! Cached outputs can be mirrored to a bucket so their URLs outlive both the
//! provider's delivery links and the worker's local cache.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{BlobConfig, BlobStore};
pub use error::{StorageError, StorageResult};
pub use keys::{combined_key, thumbnail_key};
