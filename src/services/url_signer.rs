//! HMAC-SHA256 signed URLs for the local backend.
//!
//! A signed URL carries its claims in the query string:
//!
//! ```text
//! {base}/objects/{bucket}/{key}?X-Op=PUT&X-Expires=1700000000&X-Nonce=…
//!     &X-Content-Type=image%2Fpng&X-Signature=…
//! ```
//!
//! The signature covers operation, bucket, key, expiry, nonce, content type
//! and disposition, so a URL cannot be replayed against another key or as
//! another operation. The random nonce makes every issuance distinct.

use crate::services::blob_store::{Operation, PresignRequest};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Unreserved characters plus `/`, so nested keys stay readable.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signed URL is missing `{0}`")]
    Missing(&'static str),
    #[error("signed URL was issued for {expected}, not {actual}")]
    OperationMismatch { expected: String, actual: String },
    #[error("signed URL has expired")]
    Expired,
    #[error("signed URL was issued for content type `{expected}`")]
    ContentTypeMismatch { expected: String },
    #[error("signature does not match")]
    Invalid,
    #[error("URL lifetime of {0:?} is out of range")]
    LifetimeOutOfRange(std::time::Duration),
}

/// Query parameters of an incoming signed request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedParams {
    #[serde(rename = "X-Op")]
    pub op: Option<String>,
    #[serde(rename = "X-Expires")]
    pub expires: Option<i64>,
    #[serde(rename = "X-Nonce")]
    pub nonce: Option<String>,
    #[serde(rename = "X-Content-Type")]
    pub content_type: Option<String>,
    #[serde(rename = "response-content-disposition")]
    pub disposition: Option<String>,
    #[serde(rename = "X-Signature")]
    pub signature: Option<String>,
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Build a signed URL for `request` as issued at `issued_at`.
    pub fn signed_url(
        &self,
        base_url: &str,
        bucket: &str,
        request: &PresignRequest,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SignatureError> {
        let out_of_range = || SignatureError::LifetimeOutOfRange(request.expires_in);
        let lifetime = i64::try_from(request.expires_in.as_secs()).map_err(|_| out_of_range())?;
        let expires = issued_at
            .timestamp()
            .checked_add(lifetime)
            .ok_or_else(out_of_range)?;
        let nonce = Uuid::new_v4().simple().to_string();
        let disposition = request.inline.then_some("inline");
        let signature = self.sign(
            request.operation.as_str(),
            bucket,
            &request.key,
            expires,
            &nonce,
            request.content_type.as_deref(),
            disposition,
        );

        let mut url = format!(
            "{}/objects/{}/{}?X-Op={}&X-Expires={}&X-Nonce={}",
            base_url.trim_end_matches('/'),
            utf8_percent_encode(bucket, PATH_SEGMENT),
            utf8_percent_encode(&request.key, PATH_SEGMENT),
            request.operation.as_str(),
            expires,
            nonce
        );
        if let Some(content_type) = &request.content_type {
            url.push_str("&X-Content-Type=");
            url.push_str(&utf8_percent_encode(content_type, QUERY_VALUE).to_string());
        }
        if let Some(disposition) = disposition {
            url.push_str("&response-content-disposition=");
            url.push_str(disposition);
        }
        url.push_str("&X-Signature=");
        url.push_str(&signature);
        Ok(url)
    }

    /// Check that `params` authorize `operation` on `bucket`/`key` at `now`.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        operation: Operation,
        params: &SignedParams,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let op = params.op.as_deref().ok_or(SignatureError::Missing("X-Op"))?;
        let expires = params.expires.ok_or(SignatureError::Missing("X-Expires"))?;
        let nonce = params
            .nonce
            .as_deref()
            .ok_or(SignatureError::Missing("X-Nonce"))?;
        let signature = params
            .signature
            .as_deref()
            .ok_or(SignatureError::Missing("X-Signature"))?;

        if op != operation.as_str() {
            return Err(SignatureError::OperationMismatch {
                expected: op.to_string(),
                actual: operation.as_str().to_string(),
            });
        }

        let provided = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        let mut mac = self.mac();
        mac.update(
            canonical_string(
                op,
                bucket,
                key,
                expires,
                nonce,
                params.content_type.as_deref(),
                params.disposition.as_deref(),
            )
            .as_bytes(),
        );
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Invalid)?;

        if now.timestamp() >= expires {
            return Err(SignatureError::Expired);
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn sign(
        &self,
        op: &str,
        bucket: &str,
        key: &str,
        expires: i64,
        nonce: &str,
        content_type: Option<&str>,
        disposition: Option<&str>,
    ) -> String {
        let mut mac = self.mac();
        mac.update(
            canonical_string(op, bucket, key, expires, nonce, content_type, disposition).as_bytes(),
        );
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"))
    }
}

fn canonical_string(
    op: &str,
    bucket: &str,
    key: &str,
    expires: i64,
    nonce: &str,
    content_type: Option<&str>,
    disposition: Option<&str>,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}",
        op,
        bucket,
        key,
        expires,
        nonce,
        content_type.unwrap_or(""),
        disposition.unwrap_or("")
    )
}
