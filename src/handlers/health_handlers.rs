//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that probes the configured bucket

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// `GET /healthz`
///
/// Always 200; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 200 when the bucket is configured and the backend answers its probe,
/// 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let bucket = state.settings.bucket();
    let bucket_check = match &bucket {
        Ok(_) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.message.clone()),
        },
    };

    // The probe targets the configured bucket only.
    let storage_check = match bucket {
        Ok(bucket) => match state.store.ping(bucket).await {
            Ok(()) => CheckStatus {
                ok: true,
                error: None,
            },
            Err(err) => CheckStatus {
                ok: false,
                error: Some(err.to_string()),
            },
        },
        Err(_) => CheckStatus {
            ok: false,
            error: Some("skipped: no bucket configured".into()),
        },
    };

    let overall_ok = bucket_check.ok && storage_check.ok;
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" },
        backend: state.store.backend_name(),
        checks: ReadyChecks {
            configuration: bucket_check,
            storage: storage_check,
        },
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    backend: &'static str,
    checks: ReadyChecks,
}

#[derive(Serialize)]
struct ReadyChecks {
    configuration: CheckStatus,
    storage: CheckStatus,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
