//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - **API endpoints** (state: `AppState`)
//!   - `POST /getSignedUrl` - issue a signed upload URL
//!   - `GET  /listFiles`    - list stored files with signed download URLs
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Signed object endpoints** (state: `StorageService`, local backend only)
//!   - `PUT  /objects/{bucket}/{*key}` - upload through a signed PUT URL
//!   - `GET  /objects/{bucket}/{*key}` - download through a signed GET URL
//!
//! Every route, including `OPTIONS` preflights, passes through the same CORS
//! layer. Preflights are answered by the layer itself and never reach a
//! handler or the storage backend.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        listing_handlers::list_files,
        object_handlers::{get_signed_object, put_signed_object},
        upload_handlers::issue_upload_url,
    },
    services::storage_service::StorageService,
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post, put},
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const ALLOWED_HEADERS: [&str; 9] = [
    "content-type",
    "x-amz-date",
    "authorization",
    "x-api-key",
    "x-amz-security-token",
    "origin",
    "accept",
    "referer",
    "user-agent",
];

/// Build the full application router.
///
/// `objects` is `Some` only for the local backend, whose signed URLs point
/// back at this server.
pub fn routes(
    state: AppState,
    objects: Option<StorageService>,
    cors_origins: &[String],
) -> Router {
    let api = Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/getSignedUrl", post(issue_upload_url))
        .route("/listFiles", get(list_files))
        .with_state(state);

    let router = match objects {
        Some(service) => api.merge(object_routes().with_state(service)),
        None => api,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

fn object_routes() -> Router<StorageService> {
    Router::new().route(
        "/objects/{bucket}/{*key}",
        put(put_signed_object).get(get_signed_object),
    )
}

/// One CORS policy for every route.
///
/// `*` allows any origin without credentials. An explicit origin list
/// echoes a matching request origin and allows credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(ALLOWED_HEADERS.map(HeaderName::from_static))
        .expose_headers([HeaderName::from_static("etag")])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(allowed).allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        blob_store::{BlobStore, DEFAULT_SIGNED_URL_TTL, PresignRequest},
        mock_store::MockStore,
        storage_service::tests::local_store,
    };
    use crate::state::ApiSettings;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn settings(bucket: Option<&str>) -> ApiSettings {
        ApiSettings {
            bucket: bucket.map(String::from),
            signed_url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }

    fn any_origin() -> Vec<String> {
        vec!["*".into()]
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Strip scheme and host so a signed URL can be replayed through `oneshot`.
    fn path_and_query(url: &str) -> String {
        let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let start = without_scheme.find('/').unwrap_or(without_scheme.len());
        without_scheme[start..].to_string()
    }

    #[tokio::test]
    async fn preflight_never_touches_storage() {
        let store = Arc::new(MockStore::new().with_object("a.png", 1));
        let app = routes(
            AppState::new(store.clone(), settings(Some("file-uploads"))),
            None,
            &any_origin(),
        );

        for path in ["/listFiles", "/getSignedUrl"] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(Method::OPTIONS)
                        .uri(path)
                        .header(header::ORIGIN, "https://app.example")
                        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let headers = response.headers();
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
            assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
        }
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn explicit_origins_are_echoed_with_credentials() {
        let store = Arc::new(MockStore::new());
        let app = routes(
            AppState::new(store, settings(Some("file-uploads"))),
            None,
            &["https://app.example".to_string()],
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/listFiles")
                    .header(header::ORIGIN, "https://app.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn error_responses_carry_cors_headers() {
        let store = Arc::new(MockStore::new());
        let app = routes(AppState::new(store, settings(None)), None, &any_origin());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/listFiles")
                    .header(header::ORIGIN, "https://app.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = json_body(response).await;
        assert_eq!(body["kind"], "ConfigurationError");
        assert!(body["error"].as_str().unwrap().contains("BUCKET_NAME"));
    }

    #[tokio::test]
    async fn empty_listing_is_ok_over_http() {
        let store = Arc::new(MockStore::new());
        let app = routes(
            AppState::new(store, settings(Some("file-uploads"))),
            None,
            &any_origin(),
        );

        let response = app
            .oneshot(Request::builder().uri("/listFiles").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "files": [] }));
    }

    #[tokio::test]
    async fn issue_url_over_http() {
        let store = Arc::new(MockStore::new());
        let app = routes(
            AppState::new(store, settings(Some("file-uploads"))),
            None,
            &any_origin(),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/getSignedUrl")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"fileName":"a.png","fileType":"image/png"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["signedUrl"].as_str().unwrap().contains("a.png"));
    }

    #[tokio::test]
    async fn health_endpoints_report_backend() {
        let store = Arc::new(MockStore::new());
        let app = routes(
            AppState::new(store, settings(Some("file-uploads"))),
            None,
            &any_origin(),
        );

        let live = app
            .clone()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(live.status(), StatusCode::OK);

        let ready = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["backend"], "mock");
    }

    #[tokio::test]
    async fn readiness_fails_without_bucket() {
        let store = Arc::new(MockStore::new());
        let app = routes(AppState::new(store, settings(None)), None, &any_origin());

        let ready = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readiness_probes_the_configured_bucket() {
        let (service, _dir) = local_store("http://localhost").await;
        service.ensure_bucket("uploads", "local").await.unwrap();
        let app = routes(
            AppState::new(Arc::new(service), settings(Some("not-created"))),
            None,
            &any_origin(),
        );

        let ready = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(ready).await;
        assert_eq!(body["checks"]["configuration"]["ok"], true);
        assert_eq!(body["checks"]["storage"]["ok"], false);
        assert!(
            body["checks"]["storage"]["error"]
                .as_str()
                .unwrap()
                .contains("not-created")
        );
    }

    /// Router over the local backend with bucket `uploads` created.
    async fn local_app() -> (Router, StorageService, tempfile::TempDir) {
        let (service, dir) = local_store("http://localhost").await;
        service.ensure_bucket("uploads", "local").await.unwrap();
        let app = routes(
            AppState::new(Arc::new(service.clone()), settings(Some("uploads"))),
            Some(service.clone()),
            &any_origin(),
        );
        (app, service, dir)
    }

    async fn signed_put(
        app: &Router,
        url: &str,
        content_type: &str,
        body: &'static [u8],
    ) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri(path_and_query(url))
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    async fn signed_get(app: &Router, url: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(path_and_query(url))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn signed_put_then_signed_get_round_trips_bytes() {
        let (app, service, _dir) = local_app().await;
        let put_url = service
            .presign("uploads", &PresignRequest::put("a.png", "image/png", DEFAULT_SIGNED_URL_TTL))
            .await
            .unwrap();
        assert_eq!(signed_put(&app, &put_url, "image/png", b"\x89PNG").await, StatusCode::OK);

        let get_url = service
            .presign("uploads", &PresignRequest::inline_get("a.png", DEFAULT_SIGNED_URL_TTL))
            .await
            .unwrap();
        let response = signed_get(&app, &get_url).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "inline");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn put_url_is_rejected_for_get_and_vice_versa() {
        let (app, service, _dir) = local_app().await;
        let put_url = service
            .presign("uploads", &PresignRequest::put("a.png", "image/png", DEFAULT_SIGNED_URL_TTL))
            .await
            .unwrap();
        assert_eq!(signed_get(&app, &put_url).await.status(), StatusCode::FORBIDDEN);

        let get_url = service
            .presign("uploads", &PresignRequest::inline_get("a.png", DEFAULT_SIGNED_URL_TTL))
            .await
            .unwrap();
        assert_eq!(
            signed_put(&app, &get_url, "image/png", b"x").await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn expired_url_is_rejected() {
        let (app, service, _dir) = local_app().await;
        let stale = service.signer().signed_url(
            "http://localhost",
            "uploads",
            &PresignRequest::put("a.png", "image/png", DEFAULT_SIGNED_URL_TTL),
            Utc::now() - ChronoDuration::hours(2),
        )
        .unwrap();
        assert_eq!(
            signed_put(&app, &stale, "image/png", b"x").await,
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn upload_with_wrong_content_type_is_rejected() {
        let (app, service, _dir) = local_app().await;
        let put_url = service
            .presign("uploads", &PresignRequest::put("a.png", "image/png", DEFAULT_SIGNED_URL_TTL))
            .await
            .unwrap();
        assert_eq!(
            signed_put(&app, &put_url, "text/html", b"<script>").await,
            StatusCode::FORBIDDEN
        );
        assert!(service.list_objects("uploads").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsigned_requests_are_rejected() {
        let (app, _service, _dir) = local_app().await;
        let response = signed_get(&app, "http://localhost/objects/uploads/a.png").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["kind"], "AccessDenied");
    }

    #[tokio::test]
    async fn listing_over_local_backend_reports_uploaded_sizes() {
        let (app, service, _dir) = local_app().await;
        let request = PresignRequest::put("doc.pdf", "application/pdf", DEFAULT_SIGNED_URL_TTL);
        let put_url = service.presign("uploads", &request).await.unwrap();
        assert_eq!(
            signed_put(&app, &put_url, "application/pdf", b"%PDF-1.7").await,
            StatusCode::OK
        );

        let response = app
            .oneshot(Request::builder().uri("/listFiles").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["files"][0]["name"], "doc.pdf");
        assert_eq!(body["files"][0]["size"], 8);
        assert!(
            body["files"][0]["url"]
                .as_str()
                .unwrap()
                .contains("X-Content-Type=application%2Fpdf")
        );
    }
}
