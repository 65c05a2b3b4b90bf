//! `GET /listFiles`: enumerate the bucket and attach a signed download URL to
//! every entry.

use crate::{
    errors::AppError,
    models::file::{FileEntry, FileListResponse},
    services::blob_store::{BlobStore, PresignRequest, StoredObject},
    state::AppState,
};
use axum::{Json, extract::State};
use futures::future::join_all;
use std::time::Duration;

/// Marker placed on entries whose download URL could not be minted.
pub const URL_FAILURE_MARKER: &str = "Failed to generate URL";

pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, AppError> {
    let bucket = state.settings.bucket()?;

    tracing::info!(bucket = %bucket, "Listing files");
    let objects = state.store.list_objects(bucket).await.map_err(|err| {
        tracing::error!(error = %err, bucket = %bucket, "Listing failed");
        AppError::from(err)
    })?;

    if objects.is_empty() {
        tracing::info!(bucket = %bucket, "No files found in bucket");
        return Ok(Json(FileListResponse::default()));
    }

    let ttl = state.settings.signed_url_ttl;
    let store = state.store.as_ref();
    let files = join_all(
        objects
            .into_iter()
            .map(|object| file_entry(store, bucket, object, ttl)),
    )
    .await;

    Ok(Json(FileListResponse { files }))
}

/// Build one listing entry. A signing failure is recorded on the entry
/// instead of failing the whole listing.
async fn file_entry(
    store: &dyn BlobStore,
    bucket: &str,
    object: StoredObject,
    ttl: Duration,
) -> FileEntry {
    let request = PresignRequest::inline_get(object.key.clone(), ttl);
    let (url, error) = match store.presign(bucket, &request).await {
        Ok(url) => (Some(url), None),
        Err(err) => {
            tracing::error!(
                error = %err,
                bucket = %bucket,
                key = %object.key,
                "Error generating signed URL"
            );
            (None, Some(URL_FAILURE_MARKER.to_string()))
        }
    };

    FileEntry {
        name: object.key,
        url,
        size: object.size,
        last_modified: object.last_modified,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::ErrorKind,
        services::{
            blob_store::{DEFAULT_SIGNED_URL_TTL, Operation, StorageError},
            mock_store::MockStore,
        },
        state::ApiSettings,
    };
    use axum::http::StatusCode;
    use std::sync::{Arc, atomic::Ordering};

    fn state_with(store: Arc<MockStore>, bucket: Option<&str>) -> AppState {
        AppState::new(
            store,
            ApiSettings {
                bucket: bucket.map(String::from),
                signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
            },
        )
    }

    #[tokio::test]
    async fn empty_bucket_lists_no_files() {
        let store = Arc::new(MockStore::new());
        let Json(resp) = list_files(State(state_with(store, Some("file-uploads"))))
            .await
            .unwrap();
        assert!(resp.files.is_empty());
    }

    #[tokio::test]
    async fn entries_keep_storage_order_and_carry_inline_urls() {
        let store = Arc::new(
            MockStore::new()
                .with_object("b.pdf", 20)
                .with_object("a.png", 10),
        );
        let Json(resp) = list_files(State(state_with(store.clone(), Some("file-uploads"))))
            .await
            .unwrap();

        let names: Vec<_> = resp.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b.pdf", "a.png"]);
        assert_eq!(resp.files[0].size, 20);
        assert!(resp.files.iter().all(|f| f.url.is_some() && f.error.is_none()));

        let presigned = store.presigned.lock().unwrap();
        assert_eq!(presigned.len(), 2);
        for (_, req) in presigned.iter() {
            assert_eq!(req.operation, Operation::Get);
            assert!(req.inline);
        }
        let pdf = presigned.iter().find(|(_, r)| r.key == "b.pdf").unwrap();
        assert_eq!(pdf.1.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn one_signing_failure_does_not_sink_the_listing() {
        let store = Arc::new(
            MockStore::new()
                .with_object("a.png", 10)
                .with_object("broken.jpg", 5)
                .with_object("c.pdf", 7)
                .failing_presign_for("broken.jpg"),
        );
        let Json(resp) = list_files(State(state_with(store.clone(), Some("file-uploads"))))
            .await
            .unwrap();

        assert_eq!(resp.files.len(), 3);
        let broken = &resp.files[1];
        assert_eq!(broken.name, "broken.jpg");
        assert_eq!(broken.url, None);
        assert_eq!(broken.error.as_deref(), Some(URL_FAILURE_MARKER));
        assert_eq!(broken.size, 5);
        assert!(resp.files[0].url.is_some());
        assert!(resp.files[2].url.is_some());
        assert_eq!(store.presign_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn enumeration_failure_is_a_storage_fault() {
        let store = Arc::new(MockStore::new().failing_list(StorageError::Backend("boom".into())));
        let err = list_files(State(state_with(store, Some("file-uploads"))))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StorageFault);
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_bucket_in_storage_is_not_found() {
        let store = Arc::new(
            MockStore::new().failing_list(StorageError::BucketNotFound("file-uploads".into())),
        );
        let err = list_files(State(state_with(store, Some("file-uploads"))))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_bucket_setting_stops_before_storage() {
        let store = Arc::new(MockStore::new().with_object("a.png", 1));
        let err = list_files(State(state_with(store.clone(), None)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationError);
        assert_eq!(store.total_calls(), 0);
    }

    #[test]
    fn serialized_entries_use_camel_case_and_omit_absent_fields() {
        let entry = FileEntry {
            name: "a.png".into(),
            url: None,
            size: 3,
            last_modified: chrono::DateTime::UNIX_EPOCH,
            error: Some(URL_FAILURE_MARKER.into()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("lastModified").is_some());
        assert!(json.get("url").is_none());
        assert_eq!(json["error"], URL_FAILURE_MARKER);
    }
}
