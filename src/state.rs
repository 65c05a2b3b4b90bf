//! Shared router state for the API handlers.

use crate::{errors::AppError, services::blob_store::BlobStore};
use std::{sync::Arc, time::Duration};

/// Per-deployment settings the handlers read on every request.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub bucket: Option<String>,
    pub signed_url_ttl: Duration,
}

impl ApiSettings {
    /// The configured target bucket, or a `ConfigurationError`.
    pub fn bucket(&self) -> Result<&str, AppError> {
        self.bucket
            .as_deref()
            .ok_or_else(|| AppError::configuration("BUCKET_NAME environment variable is not set"))
    }
}

/// The storage facade is injected here rather than held in a global.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn BlobStore>, settings: ApiSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }
}
