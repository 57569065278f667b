//! Blob storage for generated contracts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::util::{slug, tail};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("upload of {path} failed: {message}")]
    Upload { path: String, message: String },

    #[error("storage not configured: {0}")]
    NotConfigured(String),
}

/// Write-only view of the object store. `put` overwrites an existing object
/// at the same path and returns its public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// Helpers for working with public S3-compatible URLs.
pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    // Allow simple templating: https://host/{bucket}/{key} or https://bucket.host/{key}
    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    if trimmed.contains(bucket) {
        format!("{}/{}", trimmed, key)
    } else {
        format!("{}/{}/{}", trimmed, bucket, key)
    }
}

/// Deterministic contract location: `{buyer}/{product-slug}_{ref suffix}.pdf`.
/// Lines after the first get a `-{line}` suffix so repeated products in one
/// checkout keep separate contracts.
///
/// Re-delivery of the same payment lands on the same key.
pub fn contract_path(
    buyer_id: &str,
    product_name: &str,
    payment_reference: &str,
    line_index: usize,
) -> String {
    let buyer: String = buyer_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let suffix: String = tail(payment_reference, 8)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if line_index == 0 {
        format!("{}/{}_{}.pdf", buyer, slug(product_name), suffix)
    } else {
        format!("{}/{}_{}-{}.pdf", buyer, slug(product_name), suffix, line_index)
    }
}

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the ambient AWS configuration plus our bucket settings.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET is not set".into()))?;

        let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        // Custom S3-compatible endpoints (MinIO, R2, ...)
        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let public_base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", bucket));

        Ok(Self::new(
            S3Client::from_conf(s3_config_builder.build()),
            bucket,
            public_base_url,
        ))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        Ok(build_public_url(&self.public_base_url, &self.bucket, path))
    }
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Process-local store for dev mode and tests.
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &str) -> Option<StoredBlob> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_appends_bucket_when_missing() {
        assert_eq!(
            build_public_url("https://cdn.example.com/", "contracts", "u1/a.pdf"),
            "https://cdn.example.com/contracts/u1/a.pdf"
        );
        assert_eq!(
            build_public_url("https://contracts.s3.amazonaws.com", "contracts", "u1/a.pdf"),
            "https://contracts.s3.amazonaws.com/u1/a.pdf"
        );
        assert_eq!(
            build_public_url("https://files.example.com/{bucket}/{key}", "c", "k.pdf"),
            "https://files.example.com/c/k.pdf"
        );
    }

    #[test]
    fn contract_path_is_deterministic() {
        let path = contract_path("user-42", "Noche Azul (Prod. Rey)", "pi_3PabcdEFGH12345678", 0);
        assert_eq!(path, "user-42/noche-azul-prod-rey_12345678.pdf");
        assert_eq!(
            path,
            contract_path("user-42", "Noche Azul (Prod. Rey)", "pi_3PabcdEFGH12345678", 0)
        );
        assert_eq!(
            contract_path("user-42", "Noche Azul (Prod. Rey)", "pi_3PabcdEFGH12345678", 2),
            "user-42/noche-azul-prod-rey_12345678-2.pdf"
        );
    }

    #[tokio::test]
    async fn memory_store_overwrites_same_path() {
        let store = MemoryBlobStore::new("http://localhost/blobs/");
        let url = store.put("a/b.pdf", vec![1], PDF_CONTENT_TYPE).await.unwrap();
        store.put("a/b.pdf", vec![2, 3], PDF_CONTENT_TYPE).await.unwrap();

        assert_eq!(url, "http://localhost/blobs/a/b.pdf");
        assert_eq!(store.paths(), vec!["a/b.pdf".to_string()]);
        assert_eq!(store.get("a/b.pdf").unwrap().bytes, vec![2, 3]);
    }
}
