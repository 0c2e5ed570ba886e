//! Bucket client.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Presigned URLs are used when no public base URL is configured.
const PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// S3 API endpoint
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Usually "auto" for R2
    pub region: String,
    /// Public domain serving the bucket, e.g. `https://cdn.example.com`
    pub public_base_url: Option<String>,
}

impl BlobConfig {
    pub fn from_env() -> StorageResult<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| StorageError::MissingConfig(key.to_string()))
        };
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL")
                .ok()
                .map(|u| u.trim_end_matches('/').to_string()),
        })
    }
}

/// Blob mirror for cached assets.
#[derive(Clone)]
pub struct BlobStore {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl BlobStore {
    pub fn new(config: BlobConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        }
    }

    /// `None` when the mirror is not configured.
    pub fn from_env() -> Option<Self> {
        BlobConfig::from_env().ok().map(Self::new)
    }

    /// Upload a local file and return a URL it can be fetched from.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<String> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload(key, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload(key, e))?;

        info!("Uploaded {} to {}", path.display(), key);
        self.url_for(key).await
    }

    /// Public URL when a public domain is configured, a presigned URL otherwise.
    pub async fn url_for(&self, key: &str) -> StorageResult<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(public_url(base, key));
        }

        let presign_config = PresigningConfig::expires_in(PRESIGN_TTL)
            .map_err(|e| StorageError::presign(key, e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign(key, e))?;

        Ok(presigned.uri().to_string())
    }

    /// Confirm the bucket exists and the credentials can reach it.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::bucket(&self.bucket, e))?;
        Ok(())
    }
}

fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_public_url_joins_cleanly() {
        assert_eq!(
            public_url("https://cdn.example.com/", "/tasks/u/t/combined.mp4"),
            "https://cdn.example.com/tasks/u/t/combined.mp4"
        );
    }

    fn store_at(endpoint: &str) -> BlobStore {
        BlobStore::new(BlobConfig {
            endpoint_url: endpoint.to_string(),
            access_key_id: "k".to_string(),
            secret_access_key: "s".to_string(),
            bucket_name: "b".to_string(),
            region: "auto".to_string(),
            public_base_url: None,
        })
    }

    #[tokio::test]
    async fn test_check_connectivity_heads_the_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store_at(&server.uri()).check_connectivity().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_connectivity_reports_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = store_at(&server.uri()).check_connectivity().await.unwrap_err();
        assert!(matches!(err, StorageError::Bucket { ref bucket, .. } if bucket == "b"));
    }

    #[tokio::test]
    async fn test_public_base_url_skips_presigning() {
        let store = BlobStore::new(BlobConfig {
            endpoint_url: "http://127.0.0.1:9".to_string(),
            access_key_id: "k".to_string(),
            secret_access_key: "s".to_string(),
            bucket_name: "b".to_string(),
            region: "auto".to_string(),
            public_base_url: Some("https://cdn.example.com".to_string()),
        });
        let url = store.url_for("tasks/u/t/thumbnail.jpg").await.unwrap();
        assert_eq!(url, "https://cdn.example.com/tasks/u/t/thumbnail.jpg");
    }
}
