//! Retry configuration, delay calculation, and provider decorators.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! `Retrying*` decorators that wrap provider traits with automatic retry
//! on transient errors.
//!
//! Only [`ErrorKind::Transient`](crate::ErrorKind::Transient) failures are
//! retried in place. Rate-limit errors go straight back to the orchestrator
//! so the next vendor is tried and the circuit breaker can see them.
//!
//! Both decorators delegate to the shared `with_retry()` helper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::{ReplyModel, SpeechProvider};
use crate::Result;
use crate::telemetry;
use crate::types::{ReplyRequest, SpeechArtifact, SpeechRequest, TutorReply};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use parlante::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(2)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 2.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 250ms.
    pub initial_delay: Duration,
    /// Cap on exponential growth. Default: 5s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Run `f`, retrying transient failures up to `config.max_attempts`.
///
/// Non-transient errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                metrics::counter!(telemetry::RETRIES_TOTAL,
                    "provider" => provider_name.to_owned(),
                    "operation" => operation,
                )
                .increment(1);
                warn!(
                    provider = provider_name,
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// RetryingSpeechProvider
// ============================================================================

/// Decorator that wraps a [`SpeechProvider`] with retry logic.
pub struct RetryingSpeechProvider {
    inner: Arc<dyn SpeechProvider>,
    config: RetryConfig,
}

impl RetryingSpeechProvider {
    pub fn new(inner: Arc<dyn SpeechProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl SpeechProvider for RetryingSpeechProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact> {
        with_retry(&self.config, self.inner.name(), "synthesize", || {
            self.inner.synthesize(request)
        })
        .await
    }
}

// ============================================================================
// RetryingReplyModel
// ============================================================================

/// Decorator that wraps a [`ReplyModel`] with retry logic.
///
/// Same semantics as [`RetryingSpeechProvider`].
pub struct RetryingReplyModel {
    inner: Arc<dyn ReplyModel>,
    config: RetryConfig,
}

impl RetryingReplyModel {
    pub fn new(inner: Arc<dyn ReplyModel>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ReplyModel for RetryingReplyModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn generate(&self, request: &ReplyRequest) -> Result<TutorReply> {
        with_retry(&self.config, self.inner.name(), "reply", || {
            self.inner.generate(request)
        })
        .await
    }
}
