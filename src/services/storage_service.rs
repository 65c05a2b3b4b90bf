//! src/services/storage_service.rs
//!
//! StorageService: the local backend. Object payloads live on disk, sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{key}`; metadata lives in
//! SQLite. Signed URLs point back at this process's `/objects/...` routes and
//! are verified with the same [`UrlSigner`] that minted them.

use crate::{
    models::{bucket::Bucket, object::Object},
    services::{
        blob_store::{BlobStore, PresignRequest, StorageError, StorageResult, StoredObject},
        url_signer::UrlSigner,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::debug;
use uuid::Uuid;

const MIGRATION_SQL: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const WRITE_LOCK_STRIPES: usize = 64;

#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable origin of this server, used as the signed URL base.
    pub public_url: String,

    signer: UrlSigner,

    /// Striped locks serializing the final step of writes to the same key.
    write_locks: Arc<Vec<Mutex<()>>>,
}

impl StorageService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        signer: UrlSigner,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into(),
            signer,
            write_locks: Arc::new((0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
        }
    }

    fn key_lock(&self, bucket_name: &str, key: &str) -> &Mutex<()> {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        &self.write_locks[usize::from(digest[2]) % self.write_locks.len()]
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn run_migrations(db: &SqlitePool) -> StorageResult<()> {
        let statements = MIGRATION_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(db).await?;
        }

        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    pub fn ensure_bucket_name_safe(name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid(
                "must start and end with a lowercase letter or digit",
            ));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), keeping the file
    /// count per directory small.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        Self::ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Create `name` if it does not exist yet and return its row.
    pub async fn ensure_bucket(&self, name: &str, region: &str) -> StorageResult<Bucket> {
        Self::ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        sqlx::query(
            "INSERT INTO buckets (id, name, region, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(region.to_lowercase())
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        self.fetch_bucket(name).await
    }

    /// Stream-upload an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temp file first (MD5 and size computed on the fly), are
    /// fsynced, then renamed into place. Re-uploading a key overwrites it.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let (size_bytes, etag) = match write_payload(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        // Rename and metadata upsert happen under the key's lock, so the row
        // always describes the bytes on disk.
        let _guard = self.key_lock(&bucket_rec.name, key).lock().await;
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let insert_result = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, bucket_id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                tracing::info!(
                    bucket = %bucket,
                    key = %key,
                    size_bytes = obj.size_bytes,
                    "Local object stored"
                );
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle ready for streaming out.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// All objects in `bucket`, ordered by key.
    pub async fn list_bucket_objects(&self, bucket: &str) -> StorageResult<Vec<Object>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let rows = sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE bucket_id = ?
             ORDER BY key ASC",
        )
        .bind(bucket_rec.id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn list_objects(&self, bucket: &str) -> StorageResult<Vec<StoredObject>> {
        let rows = self.list_bucket_objects(bucket).await?;
        debug!(bucket = %bucket, count = rows.len(), "Listed local objects");
        Ok(rows.into_iter().map(StoredObject::from).collect())
    }

    async fn presign(&self, bucket: &str, request: &PresignRequest) -> StorageResult<String> {
        self.ensure_key_safe(&request.key)?;
        Self::ensure_bucket_name_safe(bucket)?;
        self.signer
            .signed_url(&self.public_url, bucket, request, Utc::now())
            .map_err(|err| StorageError::Presign(err.to_string()))
    }

    async fn ping(&self, bucket: &str) -> StorageResult<()> {
        self.fetch_bucket(bucket).await?;

        let probe = self.bucket_root(bucket).join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// Drain `stream` into a new file at `path`, fsync it, and return the byte
/// count with the hex MD5 of the payload.
async fn write_payload<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((size_bytes, format!("{:x}", digest.compute())))
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
