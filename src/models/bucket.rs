//! A bucket row of the local backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named container of objects in the local backend.
///
/// The API only ever talks to the single bucket named by `BUCKET_NAME`; the
/// local backend still keys everything by bucket so that a missing or renamed
/// bucket surfaces as "not found" instead of silently listing nothing.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    pub id: Uuid,

    /// Bucket name (S3 naming rules).
    pub name: String,

    /// Region label reported by the deployment (e.g. "us-east-1").
    pub region: String,

    pub created_at: DateTime<Utc>,
}
