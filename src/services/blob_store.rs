//! The storage capability the request handlers depend on.
//!
//! Handlers never talk to a concrete backend; they receive an
//! `Arc<dyn BlobStore>` through router state. Backends:
//! - [`crate::services::s3_store::S3Store`] - AWS S3 / S3-compatible endpoints
//! - [`crate::services::storage_service::StorageService`] - local disk + SQLite

use crate::services::content_type::content_type_for_key;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{io, time::Duration};
use thiserror::Error;

/// Lifetime of every signed URL unless configured otherwise.
pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("failed to sign URL: {0}")]
    Presign(String),
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. }
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The single storage operation a signed URL authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Get,
    Put,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Put => "PUT",
        }
    }
}

/// Everything a backend needs to mint one signed URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PresignRequest {
    pub operation: Operation,
    pub key: String,
    /// For `Put`: the content type the uploader must send.
    /// For `Get`: the content type the response is served with.
    pub content_type: Option<String>,
    /// Ask the backend to serve a `Get` with `Content-Disposition: inline`.
    pub inline: bool,
    pub expires_in: Duration,
}

impl PresignRequest {
    /// A direct-upload request for `key`, bound to `content_type`.
    pub fn put(
        key: impl Into<String>,
        content_type: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        Self {
            operation: Operation::Put,
            key: key.into(),
            content_type: Some(content_type.into()),
            inline: false,
            expires_in,
        }
    }

    /// A browser-viewable download of `key`; the response type comes from the
    /// key's extension.
    pub fn inline_get(key: impl Into<String>, expires_in: Duration) -> Self {
        let key = key.into();
        let content_type = content_type_for_key(&key).to_string();
        Self {
            operation: Operation::Get,
            key,
            content_type: Some(content_type),
            inline: true,
            expires_in,
        }
    }
}

/// Listing metadata for one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Enumerate every object in `bucket`, in the backend's native order.
    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>>;

    /// Mint a signed URL for exactly the operation and key in `request`.
    async fn presign(&self, bucket: &str, request: &PresignRequest) -> StorageResult<String>;

    /// Cheap reachability probe of `bucket`, used by `/readyz`.
    async fn ping(&self, bucket: &str) -> StorageResult<()>;

    fn backend_name(&self) -> &'static str;
}
