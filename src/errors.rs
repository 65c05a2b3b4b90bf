use crate::services::blob_store::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// The categories every handler failure is folded into before it leaves the
/// request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    ConfigurationError,
    StorageFault,
    AccessDenied,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::StorageFault => "StorageFault",
            ErrorKind::AccessDenied => "AccessDenied",
        }
    }
}

/// A request-scoped error rendered as a JSON body.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    /// Operator-facing diagnostics; omitted from the body when absent.
    pub details: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// 400, caller input was missing or malformed.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest, msg)
    }

    /// 500, a required deployment setting is absent.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ConfigurationError,
            msg,
        )
    }

    /// 500, the storage backend rejected or failed an operation.
    pub fn storage_fault(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::StorageFault,
            msg,
        )
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorKind::AccessDenied, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "kind": self.kind.as_str(),
            "status": self.status.as_u16()
        });
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let details = format!("{:?}", err);
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AppError::new(status, ErrorKind::StorageFault, err.to_string()).with_details(details)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::storage_fault(err.to_string()).with_details(format!("{:#}", err))
    }
}
