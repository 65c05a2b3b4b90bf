//! Signed object routes of the local backend.
//!
//! These are the targets of the URLs minted by `StorageService::presign`.
//! Bodies are streamed in both directions; nothing is buffered in memory.

use crate::{
    errors::AppError,
    models::object::Object,
    services::{
        blob_store::Operation,
        content_type::FALLBACK_CONTENT_TYPE,
        storage_service::StorageService,
        url_signer::{SignatureError, SignedParams},
    },
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;

/// `PUT /objects/{bucket}/{*key}` with a signed PUT URL.
pub async fn put_signed_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<SignedParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    authorize(&service, &bucket, &key, Operation::Put, &params)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    // The uploader must send the content type the URL was minted for.
    if let Some(expected) = params.content_type.as_deref() {
        if content_type.as_deref() != Some(expected) {
            let err = SignatureError::ContentTypeMismatch {
                expected: expected.to_string(),
            };
            tracing::warn!(bucket = %bucket, key = %key, error = %err, "Rejected signed upload");
            return Err(AppError::access_denied(err.to_string()));
        }
    }

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let object = service
        .upload_object_stream(&bucket, &key, content_type, stream)
        .await?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Some(etag) = object.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            response.headers_mut().insert(header::ETAG, value);
        }
    }
    Ok(response)
}

/// `GET /objects/{bucket}/{*key}` with a signed GET URL.
pub async fn get_signed_object(
    State(service): State<StorageService>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<SignedParams>,
) -> Result<Response, AppError> {
    authorize(&service, &bucket, &key, Operation::Get, &params)?;

    let (meta, file) = service.get_object_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta, &params);

    Ok(response)
}

fn authorize(
    service: &StorageService,
    bucket: &str,
    key: &str,
    operation: Operation,
    params: &SignedParams,
) -> Result<(), AppError> {
    service
        .signer()
        .verify(bucket, key, operation, params, Utc::now())
        .map_err(|err| {
            tracing::warn!(
                bucket = %bucket,
                key = %key,
                operation = operation.as_str(),
                error = %err,
                "Rejected signed request"
            );
            AppError::access_denied(err.to_string())
        })
}

/// Response headers for a signed GET. The signed `X-Content-Type` and
/// disposition take precedence over what was stored at upload time.
fn set_object_headers(headers: &mut HeaderMap, meta: &Object, params: &SignedParams) {
    let content_type = params
        .content_type
        .clone()
        .or_else(|| meta.content_type.clone())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
    );

    if params.disposition.as_deref() == Some("inline") {
        headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
    }

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0) as u64),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
