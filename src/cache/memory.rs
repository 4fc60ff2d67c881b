//! In-process artifact store.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{ArtifactStore, CacheFingerprint};
use crate::Result;
use crate::types::SpeechArtifact;

/// Bounded LRU + TTL artifact store backed by moka.
///
/// Entries are lost on restart. Suited to tests and single-process
/// deployments where disk is unavailable.
pub struct MemoryStore {
    cache: Cache<String, SpeechArtifact>,
}

impl MemoryStore {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Number of entries currently held (approximate until pending
    /// maintenance runs).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get(&self, fingerprint: &CacheFingerprint) -> Result<Option<SpeechArtifact>> {
        Ok(self.cache.get(fingerprint.as_str()).await)
    }

    async fn put(&self, fingerprint: &CacheFingerprint, artifact: &SpeechArtifact) -> Result<()> {
        self.cache
            .insert(fingerprint.as_str().to_string(), artifact.clone())
            .await;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
