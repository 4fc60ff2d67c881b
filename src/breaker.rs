//! Rate-limit circuit breaker for the reply chain.
//!
//! Two states only:
//! - Closed: calls pass through.
//! - Open: for `cooldown` after a call failed with a rate-limit error,
//!   calls are rejected with [`ParlanteError::CircuitOpen`] without running.
//!
//! There is no half-open probe; the first call after the cooldown runs
//! normally and either succeeds or re-trips the breaker. The trip instant
//! is a single value behind a lock, so concurrent trips are last-writer-wins.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;
use crate::{ParlanteError, Result};

/// Default time the breaker stays open after a trip.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Time source for the breaker.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by `tokio::time`, so paused-time tests can drive it
/// with `tokio::time::advance`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct CircuitBreaker {
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    tripped_at: Mutex<Option<Instant>>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(TokioClock))
    }

    pub fn with_clock(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown,
            clock,
            tripped_at: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time left before the breaker closes, or `None` when closed.
    pub fn remaining(&self) -> Option<Duration> {
        let tripped_at = (*self.tripped_at.lock().unwrap_or_else(PoisonError::into_inner))?;
        let elapsed = self.clock.now().saturating_duration_since(tripped_at);
        self.cooldown.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    pub fn is_open(&self) -> bool {
        self.remaining().is_some()
    }

    /// Open the breaker as of now.
    pub fn trip(&self) {
        let now = self.clock.now();
        *self.tripped_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        metrics::counter!(telemetry::CIRCUIT_TRIPS_TOTAL).increment(1);
        warn!(cooldown_secs = self.cooldown.as_secs(), "circuit breaker tripped");
    }

    /// Close the breaker immediately.
    pub fn reset(&self) {
        if self
            .tripped_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("circuit breaker reset");
        }
    }

    /// Run `f` unless the breaker is open; trip it if `f` fails with a
    /// rate-limit error (directly, or in any attempt of an exhausted chain).
    pub async fn guard<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(retry_after) = self.remaining() {
            metrics::counter!(telemetry::CIRCUIT_REJECTIONS_TOTAL).increment(1);
            return Err(ParlanteError::CircuitOpen { retry_after });
        }

        let result = f().await;
        if let Err(e) = &result
            && e.is_rate_limited()
        {
            self.trip();
        }
        result
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cooldown", &self.cooldown)
            .field("open", &self.is_open())
            .finish()
    }
}
