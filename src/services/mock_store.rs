//! In-memory `BlobStore` for handler tests.

use crate::services::blob_store::{
    BlobStore, PresignRequest, StorageError, StorageResult, StoredObject,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MockStore {
    objects: Vec<StoredObject>,
    /// Keys whose presign calls fail.
    failing_keys: HashSet<String>,
    list_error: Mutex<Option<StorageError>>,
    pub list_calls: AtomicUsize,
    pub presign_calls: AtomicUsize,
    pub presigned: Mutex<Vec<(String, PresignRequest)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: &str, size: i64) -> Self {
        self.objects.push(StoredObject {
            key: key.to_string(),
            size,
            last_modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        });
        self
    }

    pub fn failing_presign_for(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn failing_list(self, err: StorageError) -> Self {
        *self.list_error.lock().unwrap() = Some(err);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst) + self.presign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MockStore {
    async fn list_objects(&self, _bucket: &str) -> StorageResult<Vec<StoredObject>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.list_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.objects.clone())
    }

    async fn presign(&self, bucket: &str, request: &PresignRequest) -> StorageResult<String> {
        let n = self.presign_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_keys.contains(&request.key) {
            return Err(StorageError::Presign(format!("cannot sign {}", request.key)));
        }
        self.presigned
            .lock()
            .unwrap()
            .push((bucket.to_string(), request.clone()));
        Ok(format!(
            "https://{}.example.com/{}?op={}&n={}",
            bucket,
            request.key,
            request.operation.as_str(),
            n
        ))
    }

    async fn ping(&self, _bucket: &str) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
