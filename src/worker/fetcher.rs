use crate::worker::cache::CachedResponse;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use thiserror::Error;

/// A request as seen by the cache worker.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl WorkerRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(body.into()),
        }
    }

    /// Identity used as the cache key.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {message}")]
    Unreachable { url: String, message: String },
}

/// The network side of the worker.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &WorkerRequest) -> Result<CachedResponse, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &WorkerRequest) -> Result<CachedResponse, FetchError> {
        let network = |source: reqwest::Error| FetchError::Network {
            url: request.url.clone(),
            source,
        };

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body.clone() {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(network)?;

        Ok(CachedResponse::new(status, headers, body))
    }
}
