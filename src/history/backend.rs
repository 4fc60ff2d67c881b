//! Storage seam for conversation history.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::types::HistoryEntry;

/// Where session histories live.
///
/// Implementations store whole windows; trimming and per-session ordering
/// are handled by [`ConversationHistory`](super::ConversationHistory).
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Entries for `session`, oldest first. Unknown sessions are empty.
    async fn load(&self, session: &str) -> Result<Vec<HistoryEntry>>;

    /// Replace the entries for `session`.
    async fn store(&self, session: &str, entries: Vec<HistoryEntry>) -> Result<()>;

    /// Drop `session` entirely.
    async fn remove(&self, session: &str) -> Result<()>;

    fn backend_type(&self) -> &'static str;
}

/// In-process history, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryBackend {
    sessions: RwLock<HashMap<String, Vec<HistoryEntry>>>,
}

impl MemoryHistoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with stored history.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl HistoryBackend for MemoryHistoryBackend {
    async fn load(&self, session: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    async fn store(&self, session: &str, entries: Vec<HistoryEntry>) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.to_string(), entries);
        Ok(())
    }

    async fn remove(&self, session: &str) -> Result<()> {
        self.sessions.write().await.remove(session);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
