//! Named, versioned response caches.
//!
//! A [`CacheStorage`] holds any number of caches keyed by name; each cache maps
//! a request identity (`"{METHOD} {URL}"`) to the stored response. The whole
//! storage can be snapshotted to JSON so a CLI process keeps it between runs.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, io::AsyncWriteExt, sync::RwLock};
use uuid::Uuid;

type Entries = BTreeMap<String, CachedResponse>;

/// A stored response. Bodies are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "base64_body")]
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The response's `Date` header, if present and parsable.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        let raw = self.header("date")?;
        DateTime::parse_from_rfc2822(raw)
            .ok()
            .map(|date| date.with_timezone(&Utc))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    caches: BTreeMap<String, Entries>,
}

/// All named caches. Cloning shares the underlying storage.
#[derive(Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<BTreeMap<String, Entries>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` if it does not exist yet.
    pub async fn open(&self, name: &str) {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Names of every cache, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }

    /// Drop a whole cache. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        self.caches.write().await.remove(name).is_some()
    }

    pub async fn lookup(&self, name: &str, request_key: &str) -> Option<CachedResponse> {
        self.caches
            .read()
            .await
            .get(name)
            .and_then(|entries| entries.get(request_key))
            .cloned()
    }

    /// Drop one entry. Returns whether it existed.
    pub async fn remove(&self, name: &str, request_key: &str) -> bool {
        self.caches
            .write()
            .await
            .get_mut(name)
            .is_some_and(|entries| entries.remove(request_key).is_some())
    }

    /// Store one entry. The last writer for a key wins.
    pub async fn put(&self, name: &str, request_key: &str, response: CachedResponse) {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(request_key.to_string(), response);
    }

    /// Store several entries under a single lock, so readers see all or none.
    pub async fn put_all(&self, name: &str, entries: Vec<(String, CachedResponse)>) {
        let mut caches = self.caches.write().await;
        let cache = caches.entry(name.to_string()).or_default();
        cache.extend(entries);
    }

    pub async fn len(&self, name: &str) -> usize {
        self.caches
            .read()
            .await
            .get(name)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Restore from a snapshot file. A missing or unreadable snapshot yields
    /// empty storage; only I/O failures other than "not found" are errors.
    pub async fn load(path: &Path) -> io::Result<Self> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(err) => return Err(err),
        };
        match serde_json::from_slice::<Snapshot>(&raw) {
            Ok(snapshot) => Ok(Self {
                caches: Arc::new(RwLock::new(snapshot.caches)),
            }),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Discarding unreadable cache snapshot"
                );
                Ok(Self::new())
            }
        }
    }

    /// Write the snapshot to a temp file next to `path`, then rename it into
    /// place so readers never see a partial file.
    pub async fn save(&self, path: &Path) -> io::Result<()> {
        let snapshot = Snapshot {
            caches: self.caches.read().await.clone(),
        };
        let raw = serde_json::to_vec(&snapshot)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).await?;
        let tmp_path = dir.join(format!(".cache-{}.tmp", Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, &raw).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        Ok(())
    }
}

async fn write_synced(path: &Path, raw: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(raw).await?;
    file.sync_all().await
}

mod base64_body {
    use base64::{Engine as _, engine::general_purpose};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
