//! Bounded per-session conversation history.
//!
//! [`ConversationHistory`] keeps at most `window` entries per session,
//! dropping the oldest first. Appends to the same session are serialized
//! by a per-session lock, so two concurrent turns never overwrite each
//! other's load-modify-store.

mod backend;

pub use backend::{HistoryBackend, MemoryHistoryBackend};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::types::HistoryEntry;
use crate::{ParlanteError, Result};

/// Default number of entries kept per session.
pub const DEFAULT_WINDOW: usize = 10;

pub struct ConversationHistory {
    backend: Arc<dyn HistoryBackend>,
    window: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(Arc::new(MemoryHistoryBackend::new()), DEFAULT_WINDOW)
    }
}

impl ConversationHistory {
    /// `window` is clamped to at least 1.
    pub fn new(backend: Arc<dyn HistoryBackend>, window: usize) -> Self {
        Self {
            backend,
            window: window.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn backend_type(&self) -> &'static str {
        self.backend.backend_type()
    }

    fn session_lock(&self, session: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(session.to_string()).or_default())
    }

    /// Drop the session's lock entry once nobody else holds it. Clones are
    /// only handed out under the map lock, so a count of two (map + ours)
    /// means no other task can be waiting on it.
    fn release_lock(&self, session: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session);
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Append one entry, trimming the session to the newest `window` entries.
    pub async fn append(&self, session: &str, entry: HistoryEntry) -> Result<()> {
        validate_session(session)?;
        let lock = self.session_lock(session);
        let result = {
            let _guard = lock.lock().await;
            self.append_locked(session, entry).await
        };
        self.release_lock(session, lock);
        result
    }

    async fn append_locked(&self, session: &str, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.backend.load(session).await?;
        entries.push(entry);
        if entries.len() > self.window {
            let excess = entries.len() - self.window;
            entries.drain(..excess);
            debug!(session, dropped = excess, "history trimmed");
        }
        self.backend.store(session, entries).await
    }

    /// Entries for `session`, oldest first.
    pub async fn get(&self, session: &str) -> Result<Vec<HistoryEntry>> {
        validate_session(session)?;
        self.backend.load(session).await
    }

    /// Forget everything for `session`.
    pub async fn reset(&self, session: &str) -> Result<()> {
        validate_session(session)?;
        let lock = self.session_lock(session);
        let result = {
            let _guard = lock.lock().await;
            self.backend.remove(session).await
        };
        self.release_lock(session, lock);
        result?;
        debug!(session, "history reset");
        Ok(())
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("backend", &self.backend.backend_type())
            .field("window", &self.window)
            .finish()
    }
}

fn validate_session(session: &str) -> Result<()> {
    if session.trim().is_empty() {
        return Err(ParlanteError::InvalidInput("session id is empty".into()));
    }
    Ok(())
}
