//! HTTP client for the gateway API.
//!
//! Uploads go straight to the signed URL; listings are routed through the
//! [`CacheWorker`] so a stale listing can still be shown while offline.

use crate::{
    models::file::{FileEntry, FileListResponse, UploadUrlRequest, UploadUrlResponse},
    services::content_type::content_type_for_key,
    worker::{
        cache::CachedResponse,
        cache_worker::{CacheWorker, ResponseSource, WorkerConfig, WorkerError},
        fetcher::WorkerRequest,
    },
};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("upload rejected with status {status}: {body}")]
    UploadRejected { status: u16, body: String },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} has no usable file name", .0.display())]
    InvalidPath(PathBuf),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub source: ResponseSource,
}

impl Listing {
    pub fn is_stale(&self) -> bool {
        self.source == ResponseSource::StaleFallback
    }
}

pub struct UploadClient {
    http: reqwest::Client,
    api_url: String,
    worker: CacheWorker,
}

impl UploadClient {
    pub fn new(http: reqwest::Client, api_url: &str, worker: CacheWorker) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            worker,
        }
    }

    /// Worker settings for a CLI talking to `api_url`: nothing to precache,
    /// and the listing route counts as an API request.
    pub fn worker_config(api_url: &str) -> WorkerConfig {
        WorkerConfig::new(api_url)
            .with_precache(Vec::new())
            .with_api_marker("/listFiles")
    }

    fn listing_request(&self) -> WorkerRequest {
        WorkerRequest::get(format!("{}/listFiles", self.api_url))
    }

    pub fn worker(&self) -> &CacheWorker {
        &self.worker
    }

    pub async fn request_upload_url(
        &self,
        file_name: &str,
        file_type: &str,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/getSignedUrl", self.api_url))
            .json(&UploadUrlRequest {
                file_name: Some(file_name.to_string()),
                file_type: Some(file_type.to_string()),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        let parsed: UploadUrlResponse = serde_json::from_slice(&body)?;
        Ok(parsed.signed_url)
    }

    /// Upload `path` under its file name with a content type taken from the
    /// extension.
    pub async fn upload(&self, path: &Path) -> Result<UploadOutcome, ClientError> {
        let key = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidPath(path.to_path_buf()))?
            .to_string();
        let content_type = content_type_for_key(&key).to_string();

        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let size = bytes.len();

        let signed_url = self.request_upload_url(&key, &content_type).await?;
        tracing::debug!(key = %key, content_type = %content_type, size, "Uploading to signed URL");

        let response = self
            .http
            .put(&signed_url)
            .header(CONTENT_TYPE, &content_type)
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(key = %key, size, "Upload complete");
        // A cached listing no longer reflects the bucket.
        if self.worker.invalidate(&self.listing_request()).await {
            tracing::debug!("Dropped cached listing after upload");
        }
        Ok(UploadOutcome {
            key,
            content_type,
            size,
        })
    }

    pub async fn list_files(&self) -> Result<Listing, ClientError> {
        let request = self.listing_request();
        let served = self.worker.fetch(&request).await?;

        if served.source == ResponseSource::StaleFallback {
            tracing::warn!(url = %request.url, "API unreachable, showing a cached listing");
        }

        let CachedResponse { status, body, .. } = served.response;
        if !(200..300).contains(&status) {
            return Err(api_error(status, &body));
        }
        let parsed: FileListResponse = serde_json::from_slice(&body)?;
        Ok(Listing {
            files: parsed.files,
            source: served.source,
        })
    }
}

fn api_error(status: u16, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    ClientError::Api { status, message }
}
