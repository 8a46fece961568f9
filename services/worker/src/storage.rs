//! Archive storage backends and the envelope uploader.
//!
//! The uploader writes one object per envelope under a time-partitioned key
//! derived from the *processing* time, not any timestamp inside the envelope.
//! Backends implement [`ObjectStore`]; the live implementation targets S3 and
//! the offline implementation mirrors the key layout onto the local
//! filesystem for hermetic testing.

use crate::config::StorageConfig;
use crate::envelope::Envelope;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur while archiving an envelope
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Local write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A durable object store keyed by string paths.
///
/// Implementations must be atomic from the caller's perspective: readers see
/// either nothing at the key or the complete object.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a complete object at the given key
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store from configuration
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!(key = %key, bucket = %self.bucket, "Object written to S3");
        Ok(())
    }
}

/// Filesystem-backed object store mirroring the S3 key layout.
///
/// Used in offline mode and in tests. Writes go to a temporary file in the
/// target directory followed by a rename, so a key never holds a partial
/// object.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a local object store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path backing a key
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |p, part| p.join(part))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for_key(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(key = %key, path = %path.display(), "Object written to local store");
        Ok(())
    }
}

/// Uploads envelopes to the archive under time-partitioned keys.
///
/// Key format: `{prefix}/{YYYY}/{MM}/{DD}/{message_id}.json`, partitioned by
/// the current processing date so that lifecycle policies can expire whole
/// day prefixes.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl Uploader {
    /// Create a new uploader writing through the given store
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Generate the archive key for a message id at the given processing time
    pub fn object_key(&self, message_id: &str, processed_at: DateTime<Utc>) -> String {
        format!(
            "{prefix}/{date}/{message_id}.json",
            prefix = self.prefix,
            date = processed_at.format("%Y/%m/%d"),
            message_id = sanitize_path_component(message_id),
        )
    }

    /// Archive a single envelope, returning the key it was written under
    #[instrument(skip(self, envelope), fields(message_id = %envelope.message_id))]
    pub async fn upload(&self, envelope: &Envelope) -> Result<String, StorageError> {
        let key = self.object_key(&envelope.message_id, Utc::now());
        let body = serde_json::to_vec_pretty(envelope)?;
        let size_bytes = body.len();

        self.store.put(&key, body, "application/json").await?;

        info!(key = %key, size_bytes, "Envelope archived");
        Ok(key)
    }
}

/// Sanitize a key component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
