//! Provider traits for the two capabilities parlante routes.
//!
//! Each vendor implements exactly one capability trait. Orchestrators hold
//! `Arc<dyn ...>` lists in priority order and never see vendor types.
//!
//! # Configuration
//!
//! Adapters are always constructible, even without credentials, and
//! self-report via `is_configured()`. Orchestrators skip unconfigured
//! adapters entirely: they are never invoked and never show up in an
//! aggregate failure.
//!
//! # Errors
//!
//! Implementations return [`ParlanteError::Provider`](crate::ParlanteError::Provider)
//! with a normalized [`ErrorKind`](crate::ErrorKind). Any other error variant
//! is recorded by the orchestrator as `Unknown`.

use async_trait::async_trait;

use crate::Result;
use crate::types::{ReplyRequest, SpeechArtifact, SpeechRequest, TutorReply};

/// A text-to-speech vendor.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Stable adapter name, used in `served_by`, logs and metrics.
    fn name(&self) -> &str;

    /// Whether credentials are present. Unconfigured adapters are skipped.
    fn is_configured(&self) -> bool;

    /// Synthesize speech for a validated request.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact>;
}

/// A model that can write tutor replies.
#[async_trait]
pub trait ReplyModel: Send + Sync {
    /// Model name, used in `served_by`, logs and metrics.
    fn name(&self) -> &str;

    fn is_configured(&self) -> bool;

    /// Produce a reply to `request.message` given prior history.
    async fn generate(&self, request: &ReplyRequest) -> Result<TutorReply>;
}
