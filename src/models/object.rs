//! Represents an object (file) stored in a bucket of the local backend.

use crate::services::blob_store::StoredObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for one uploaded object. The payload itself lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type the object was uploaded with.
    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: Option<String>,

    pub last_modified: DateTime<Utc>,
}

impl From<Object> for StoredObject {
    fn from(obj: Object) -> Self {
        StoredObject {
            key: obj.key,
            size: obj.size_bytes,
            last_modified: obj.last_modified,
        }
    }
}
