//! Content-addressed artifact cache.
//!
//! Synthesized audio is keyed by a [`CacheFingerprint`] of the normalized
//! request, so the same sentence in the same voice is paid for once.
//!
//! - [`ContentAddressedCache`] is what the orchestrator talks to. It never
//!   fails: storage errors are logged and reported as a miss (on read) or
//!   ignored (on write), so a broken disk degrades to "always synthesize".
//! - [`ArtifactStore`] is the backend seam, with a filesystem
//!   implementation ([`FilesystemStore`]) and an in-memory one
//!   ([`MemoryStore`]).

pub mod fingerprint;
pub mod memory;
pub mod store;

pub use fingerprint::CacheFingerprint;
pub use memory::MemoryStore;
pub use store::{ArtifactStore, FilesystemStore};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::Result;
use crate::telemetry;
use crate::types::SpeechArtifact;

/// `served_by` value reported for cache hits.
pub const CACHE_PROVIDER: &str = "cache";

/// Configuration for the artifact cache.
///
/// Without a `dir` the cache lives in memory. Deserializes from the
/// `[cache]` table of the config file:
///
/// ```rust
/// # use parlante::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .dir("/var/cache/parlante")
///     .ttl(Duration::from_secs(7 * 24 * 3600));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for the filesystem backend.
    pub dir: Option<PathBuf>,
    /// Entry bound for the memory backend. Default: 10,000.
    pub max_entries: u64,
    /// Entry lifetime in seconds. Default: 30 days.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_entries: 10_000,
            ttl_secs: 30 * 24 * 3600,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store artifacts on disk under `dir`.
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Build the configured backend and wrap it.
    pub async fn open(&self) -> Result<ContentAddressedCache> {
        let store: Arc<dyn ArtifactStore> = match &self.dir {
            Some(dir) => Arc::new(FilesystemStore::open(dir, Some(self.ttl_duration())).await?),
            None => Arc::new(MemoryStore::new(self.max_entries, self.ttl_duration())),
        };
        Ok(ContentAddressedCache::new(store))
    }
}

/// Infallible facade over an [`ArtifactStore`].
#[derive(Clone)]
pub struct ContentAddressedCache {
    store: Arc<dyn ArtifactStore>,
}

impl ContentAddressedCache {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// In-memory cache with default bounds.
    pub fn in_memory() -> Self {
        let config = CacheConfig::default();
        Self::new(Arc::new(MemoryStore::new(
            config.max_entries,
            config.ttl_duration(),
        )))
    }

    pub fn backend_type(&self) -> &'static str {
        self.store.backend_type()
    }

    /// Look up an artifact. Storage errors count as a miss.
    pub async fn get(&self, fingerprint: &CacheFingerprint) -> Option<SpeechArtifact> {
        match self.store.get(fingerprint).await {
            Ok(Some(artifact)) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                debug!(%fingerprint, provider = %artifact.provider, "artifact cache hit");
                Some(artifact)
            }
            Ok(None) => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
            Err(e) => {
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => "get").increment(1);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                warn!(
                    %fingerprint,
                    backend = self.store.backend_type(),
                    error = %e,
                    "artifact cache read failed, treating as miss"
                );
                None
            }
        }
    }

    /// Store an artifact. Storage errors are logged and dropped.
    pub async fn put(&self, fingerprint: &CacheFingerprint, artifact: &SpeechArtifact) {
        if let Err(e) = self.store.put(fingerprint, artifact).await {
            metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "op" => "put").increment(1);
            warn!(
                %fingerprint,
                backend = self.store.backend_type(),
                error = %e,
                "artifact cache write failed"
            );
        }
    }
}

impl std::fmt::Debug for ContentAddressedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAddressedCache")
            .field("backend", &self.store.backend_type())
            .finish()
    }
}
