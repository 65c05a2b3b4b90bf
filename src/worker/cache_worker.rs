//! Request interception with a versioned cache.
//!
//! Static assets are cache-first. API responses (URLs carrying one of the
//! configured markers) are refreshed once older than the expiry window, and
//! the stale copy is served when the refresh fails.

use crate::worker::{
    cache::{CacheStorage, CachedResponse},
    fetcher::{FetchError, Fetcher, WorkerRequest},
};
use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use http::Method;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CACHE_NAME: &str = "upload-gateway-v1";
pub const DEFAULT_PRECACHE: &[&str] = &["/", "/index.html", "/manifest.json"];
pub const DEFAULT_API_MARKERS: &[&str] = &["/api/", "execute-api"];

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("precache of {url} failed: {source}")]
    Install {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("precache of {url} returned status {status}")]
    InstallStatus { url: String, status: u16 },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Current cache version; every other cache is evicted on activate.
    pub cache_name: String,
    pub expiry: Duration,
    /// Paths resolved against `origin` during install.
    pub precache: Vec<String>,
    pub api_markers: Vec<String>,
    pub origin: String,
}

impl WorkerConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            expiry: Duration::hours(1),
            precache: DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
            api_markers: DEFAULT_API_MARKERS.iter().map(|m| m.to_string()).collect(),
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    pub fn with_precache(mut self, paths: Vec<String>) -> Self {
        self.precache = paths;
        self
    }

    pub fn with_api_marker(mut self, marker: impl Into<String>) -> Self {
        self.api_markers.push(marker.into());
        self
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.origin, path.trim_start_matches('/'))
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// A stale API entry, served because the refresh failed.
    StaleFallback,
}

#[derive(Debug, Clone)]
pub struct Served {
    pub response: CachedResponse,
    pub source: ResponseSource,
}

impl Served {
    fn new(response: CachedResponse, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

#[derive(Clone)]
pub struct CacheWorker {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl CacheWorker {
    pub fn new(config: WorkerConfig, storage: CacheStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            fetcher,
        }
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    /// Precache every configured asset. Either all of them land in the
    /// current cache or none do.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let name = &self.config.cache_name;
        self.storage.open(name).await;

        let fetches = self.config.precache.iter().map(|path| {
            let request = WorkerRequest::get(self.config.resolve(path));
            async move {
                let response =
                    self.fetcher
                        .fetch(&request)
                        .await
                        .map_err(|source| WorkerError::Install {
                            url: request.url.clone(),
                            source,
                        })?;
                if !response.is_success() {
                    return Err(WorkerError::InstallStatus {
                        url: request.url.clone(),
                        status: response.status,
                    });
                }
                Ok::<_, WorkerError>((request.cache_key(), response))
            }
        });

        let entries = try_join_all(fetches).await.inspect_err(|err| {
            tracing::warn!(cache = %name, error = %err, "Cache install aborted");
        })?;

        let count = entries.len();
        self.storage.put_all(name, entries).await;
        tracing::info!(cache = %name, assets = count, "Cache installed");
        Ok(())
    }

    /// Drop every cache except the current one; returns the evicted names.
    pub async fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.storage.keys().await {
            if name != self.config.cache_name && self.storage.delete(&name).await {
                tracing::info!(cache = %name, "Deleting old cache");
                deleted.push(name);
            }
        }
        deleted
    }

    /// Forget the current cache's entry for `request`, so the next fetch goes
    /// to the network. Returns whether an entry was dropped.
    pub async fn invalidate(&self, request: &WorkerRequest) -> bool {
        self.storage
            .remove(&self.config.cache_name, &request.cache_key())
            .await
    }

    pub async fn fetch(&self, request: &WorkerRequest) -> Result<Served, WorkerError> {
        if request.method != Method::GET {
            let response = self.fetcher.fetch(request).await?;
            return Ok(Served::new(response, ResponseSource::Network));
        }

        let name = &self.config.cache_name;
        let key = request.cache_key();
        let cached = self.storage.lookup(name, &key).await;

        if self.is_api_request(&request.url) {
            return match cached {
                Some(entry) if self.is_expired(&entry, Utc::now()) => {
                    match self.fetcher.fetch(request).await {
                        Ok(fresh) => {
                            self.storage.put(name, &key, fresh.clone()).await;
                            Ok(Served::new(fresh, ResponseSource::Network))
                        }
                        Err(err) => {
                            tracing::warn!(
                                url = %request.url,
                                error = %err,
                                "Refresh failed, serving stale cached response"
                            );
                            Ok(Served::new(entry, ResponseSource::StaleFallback))
                        }
                    }
                }
                Some(entry) => Ok(Served::new(entry, ResponseSource::Cache)),
                None => self.fetch_and_store(request, &key).await,
            };
        }

        match cached {
            Some(entry) => Ok(Served::new(entry, ResponseSource::Cache)),
            None => self.fetch_and_store(request, &key).await,
        }
    }

    async fn fetch_and_store(
        &self,
        request: &WorkerRequest,
        key: &str,
    ) -> Result<Served, WorkerError> {
        let response = self.fetcher.fetch(request).await?;
        self.storage
            .put(&self.config.cache_name, key, response.clone())
            .await;
        Ok(Served::new(response, ResponseSource::Network))
    }

    fn is_api_request(&self, url: &str) -> bool {
        self.config
            .api_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }

    /// Entries without a usable `Date` header never expire.
    fn is_expired(&self, entry: &CachedResponse, now: DateTime<Utc>) -> bool {
        entry
            .date()
            .is_some_and(|date| now - date > self.config.expiry)
    }
}
