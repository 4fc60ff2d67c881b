//! Durable artifact storage backends.
//!
//! [`ArtifactStore`] is the seam between the cache and where bytes live.
//! [`FilesystemStore`] keeps one payload file and one JSON metadata file per
//! fingerprint; [`MemoryStore`](super::memory::MemoryStore) keeps them in a
//! bounded in-process LRU.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::CacheFingerprint;
use crate::Result;
use crate::types::SpeechArtifact;

/// Storage backend for cached artifacts.
///
/// Implementations report storage failures as errors; deciding that a
/// failure is harmless is the job of [`ContentAddressedCache`](super::ContentAddressedCache).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Look up an artifact. `Ok(None)` on miss or expiry.
    async fn get(&self, fingerprint: &CacheFingerprint) -> Result<Option<SpeechArtifact>>;

    /// Store an artifact, replacing any previous entry for the fingerprint.
    async fn put(&self, fingerprint: &CacheFingerprint, artifact: &SpeechArtifact) -> Result<()>;

    /// Backend identifier for logs.
    fn backend_type(&self) -> &'static str;
}

/// Sidecar metadata written next to each payload.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    content_type: String,
    provider: String,
    /// Unix seconds.
    created_at: i64,
    size: usize,
}

/// Per-process counter keeping temp file names unique across writers.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem artifact store.
///
/// Layout: `<root>/<shard>/<fingerprint>.bin` plus
/// `<root>/<shard>/<fingerprint>.meta.json`. Both files are written to a
/// unique temp path and renamed into place, so concurrent writers for the
/// same fingerprint are last-writer-wins and readers never observe a
/// partially written file.
pub struct FilesystemStore {
    root: PathBuf,
    ttl: Option<Duration>,
}

impl FilesystemStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Entries older than `ttl` are treated as misses and deleted on read.
    pub async fn open(root: impl Into<PathBuf>, ttl: Option<Duration>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root, ttl })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the payload file for a fingerprint.
    pub fn payload_path(&self, fingerprint: &CacheFingerprint) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(format!("{fingerprint}.bin"))
    }

    fn meta_path(&self, fingerprint: &CacheFingerprint) -> PathBuf {
        self.root
            .join(fingerprint.shard())
            .join(format!("{fingerprint}.meta.json"))
    }

    fn is_expired(&self, meta: &EntryMeta) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now().timestamp().saturating_sub(meta.created_at);
                age < 0 || age as u64 >= ttl.as_secs()
            }
            None => false,
        }
    }

    async fn remove(&self, fingerprint: &CacheFingerprint) {
        let _ = fs::remove_file(self.meta_path(fingerprint)).await;
        let _ = fs::remove_file(self.payload_path(fingerprint)).await;
    }
}

/// Write `data` to `path` through a uniquely named temp file.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp = path.with_extension(format!("{}.{n}.tmp", std::process::id()));
    let mut file = fs::File::create(&temp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn get(&self, fingerprint: &CacheFingerprint) -> Result<Option<SpeechArtifact>> {
        let meta_bytes = match fs::read(self.meta_path(fingerprint)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: EntryMeta = serde_json::from_slice(&meta_bytes)?;

        if self.is_expired(&meta) {
            debug!(%fingerprint, "cache entry expired");
            self.remove(fingerprint).await;
            return Ok(None);
        }

        let bytes = match fs::read(self.payload_path(fingerprint)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() != meta.size {
            // payload and metadata from different writes; wait for the next put
            debug!(%fingerprint, expected = meta.size, actual = bytes.len(), "cache entry size mismatch");
            return Ok(None);
        }

        Ok(Some(SpeechArtifact {
            bytes,
            content_type: meta.content_type,
            provider: meta.provider,
        }))
    }

    async fn put(&self, fingerprint: &CacheFingerprint, artifact: &SpeechArtifact) -> Result<()> {
        let payload_path = self.payload_path(fingerprint);
        if let Some(parent) = payload_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        write_atomic(&payload_path, &artifact.bytes).await?;

        let meta = EntryMeta {
            content_type: artifact.content_type.clone(),
            provider: artifact.provider.clone(),
            created_at: Utc::now().timestamp(),
            size: artifact.bytes.len(),
        };
        write_atomic(&self.meta_path(fingerprint), &serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SpeechRequest, VoiceOptions};

    fn fingerprint(text: &str) -> CacheFingerprint {
        CacheFingerprint::of(&SpeechRequest::new(text, "es", VoiceOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path(), None).await.unwrap();
        let fp = fingerprint("Hola");
        let artifact = SpeechArtifact::new(vec![1, 2, 3], "audio/mpeg", "polly");

        assert!(store.get(&fp).await.unwrap().is_none());
        store.put(&fp, &artifact).await.unwrap();

        let cached = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(cached, artifact);
        assert!(store.payload_path(&fp).exists());
    }

    #[tokio::test]
    async fn zero_ttl_expires_and_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path(), Some(Duration::ZERO))
            .await
            .unwrap();
        let fp = fingerprint("Adiós");
        store
            .put(&fp, &SpeechArtifact::new(vec![9], "audio/mpeg", "google-tts"))
            .await
            .unwrap();

        assert!(store.get(&fp).await.unwrap().is_none());
        assert!(!store.payload_path(&fp).exists());
    }

    #[tokio::test]
    async fn overwrite_is_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path(), None).await.unwrap();
        let fp = fingerprint("Gracias");
        store
            .put(&fp, &SpeechArtifact::new(vec![1], "audio/mpeg", "a"))
            .await
            .unwrap();
        store
            .put(&fp, &SpeechArtifact::new(vec![2, 2], "audio/mpeg", "b"))
            .await
            .unwrap();

        let cached = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(cached.bytes, vec![2, 2]);
        assert_eq!(cached.provider, "b");
    }

    #[tokio::test]
    async fn corrupt_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::open(dir.path(), None).await.unwrap();
        let fp = fingerprint("Buenos días");
        let meta = store.meta_path(&fp);
        fs::create_dir_all(meta.parent().unwrap()).await.unwrap();
        fs::write(&meta, b"not json").await.unwrap();

        assert!(store.get(&fp).await.is_err());
    }
}
