//! `POST /getSignedUrl`: mint a signed PUT URL for a direct upload.

use crate::{
    errors::AppError,
    models::file::{UploadUrlRequest, UploadUrlResponse},
    services::blob_store::PresignRequest,
    state::AppState,
};
use axum::{Json, body::Bytes, extract::State};

/// Validate `{fileName, fileType}` and return `{signedUrl}`.
///
/// No object is created here; the caller performs the PUT against the
/// returned URL.
pub async fn issue_upload_url(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let (file_name, file_type) = parse_upload_request(&body)?;
    let bucket = state.settings.bucket()?;

    tracing::info!(
        file_name = %file_name,
        file_type = %file_type,
        bucket = %bucket,
        "Generating signed upload URL"
    );

    let request = PresignRequest::put(file_name, file_type, state.settings.signed_url_ttl);
    let signed_url = state.store.presign(bucket, &request).await.map_err(|err| {
        tracing::error!(
            error = %err,
            bucket = %bucket,
            key = %request.key,
            "Upload URL signing failed"
        );
        AppError::from(err)
    })?;

    Ok(Json(UploadUrlResponse { signed_url }))
}

fn parse_upload_request(body: &[u8]) -> Result<(String, String), AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!("No request body provided");
        return Err(AppError::invalid_request("No request body provided"));
    }

    let parsed: UploadUrlRequest = serde_json::from_slice(body).map_err(|err| {
        tracing::warn!(error = %err, "Failed to parse request body");
        AppError::invalid_request("Invalid JSON in request body")
    })?;

    match (parsed.file_name, parsed.file_type) {
        (Some(name), Some(kind)) if !name.is_empty() && !kind.is_empty() => Ok((name, kind)),
        (name, kind) => {
            tracing::warn!(file_name = ?name, file_type = ?kind, "Missing required fields");
            Err(AppError::invalid_request("fileName and fileType are required"))
        }
    }
}
