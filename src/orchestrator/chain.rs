//! Ordered fallback loop shared by the speech and reply paths.
//!
//! ```text
//!   candidates (priority order)
//!        │
//!        ▼
//!   ┌──────────────┐  unconfigured ──► skipped, never invoked
//!   │  candidate 0 │──┐
//!   └──────────────┘  │ error / timeout ──► Attempt recorded
//!        ▼            │
//!   ┌──────────────┐  │
//!   │  candidate 1 │──┤
//!   └──────────────┘  │
//!        ▼            ▼
//!      first Ok     Exhausted { attempts }
//! ```
//!
//! Attempts are strictly sequential. Each attempt is bounded by a timeout;
//! hitting it counts as a transient failure of that candidate.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::providers::{ReplyModel, SpeechProvider};
use crate::telemetry;
use crate::{Attempt, ParlanteError, ProviderError, Result};

/// Something the loop can try: anything with a name and a readiness flag.
pub(crate) trait Candidate: Send + Sync {
    fn label(&self) -> &str;
    fn available(&self) -> bool;
}

impl Candidate for dyn SpeechProvider {
    fn label(&self) -> &str {
        self.name()
    }

    fn available(&self) -> bool {
        self.is_configured()
    }
}

impl Candidate for dyn ReplyModel {
    fn label(&self) -> &str {
        self.name()
    }

    fn available(&self) -> bool {
        self.is_configured()
    }
}

/// A successful result and the candidate that produced it.
#[derive(Debug)]
pub(crate) struct Served<T> {
    pub value: T,
    pub provider: String,
}

/// Reduce any error from an adapter to a provider error for the record.
fn to_provider_error(err: ParlanteError) -> ProviderError {
    match err {
        ParlanteError::Provider(e) => e,
        other => ProviderError::unknown(other.to_string()),
    }
}

/// Try `candidates` in order until one succeeds.
///
/// Unconfigured candidates are skipped without being called. Returns
/// [`ParlanteError::Exhausted`] carrying one [`Attempt`] per failed call;
/// the list is empty when nothing was configured.
pub(crate) async fn run<P, T, F, Fut>(
    operation: &'static str,
    candidates: &[Arc<P>],
    attempt_timeout: Duration,
    call: F,
) -> Result<Served<T>>
where
    P: Candidate + ?Sized,
    F: Fn(Arc<P>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempts = Vec::new();

    for candidate in candidates {
        let name = candidate.label().to_string();
        if !candidate.available() {
            debug!(provider = %name, operation, "skipping unconfigured provider");
            continue;
        }

        let error = match tokio::time::timeout(attempt_timeout, call(Arc::clone(candidate))).await
        {
            Ok(Ok(value)) => {
                record_request(operation, &name, start, true);
                return Ok(Served {
                    value,
                    provider: name,
                });
            }
            Ok(Err(e)) => to_provider_error(e),
            Err(_) => ProviderError::transient(format!(
                "no response within {}s",
                attempt_timeout.as_secs_f64()
            ))
            .with_code("timeout"),
        };

        warn!(
            provider = %name,
            operation,
            kind = %error.kind,
            error = %error,
            "provider attempt failed, falling back"
        );
        metrics::counter!(telemetry::FALLBACKS_TOTAL,
            "provider" => name.clone(),
            "operation" => operation,
            "kind" => error.kind.as_str(),
        )
        .increment(1);
        attempts.push(Attempt {
            provider: name,
            error,
        });
    }

    record_request(operation, "none", start, false);
    Err(ParlanteError::Exhausted { attempts })
}

/// Record request count and duration.
pub(crate) fn record_request(operation: &'static str, provider: &str, start: Instant, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    let elapsed = start.elapsed().as_secs_f64();
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
        "provider" => provider.to_owned(),
        "operation" => operation,
    )
    .record(elapsed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::types::{SpeechArtifact, SpeechRequest, VoiceOptions};
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        configured: bool,
        outcome: std::result::Result<(), ErrorKind>,
        delay: Duration,
    }

    #[async_trait]
    impl SpeechProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn synthesize(&self, _: &SpeechRequest) -> Result<SpeechArtifact> {
            tokio::time::sleep(self.delay).await;
            match self.outcome {
                Ok(()) => Ok(SpeechArtifact::new(vec![1], "audio/mpeg", self.name)),
                Err(kind) => Err(ProviderError::new(kind, "boom").into()),
            }
        }
    }

    fn fixed(name: &'static str, outcome: std::result::Result<(), ErrorKind>) -> Arc<dyn SpeechProvider> {
        Arc::new(Fixed {
            name,
            configured: true,
            outcome,
            delay: Duration::ZERO,
        })
    }

    async fn synthesize_all(candidates: &[Arc<dyn SpeechProvider>]) -> Result<Served<SpeechArtifact>> {
        let request = SpeechRequest::new("Hola", "es", VoiceOptions::default()).unwrap();
        let request = &request;
        run("synthesize", candidates, Duration::from_secs(5), |p| async move {
            p.synthesize(request).await
        })
        .await
    }

    #[tokio::test]
    async fn first_success_wins() {
        let candidates = vec![
            fixed("a", Err(ErrorKind::Transient)),
            fixed("b", Ok(())),
            fixed("c", Ok(())),
        ];
        let served = synthesize_all(&candidates).await.unwrap();
        assert_eq!(served.provider, "b");
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted_without_attempts() {
        let err = synthesize_all(&[]).await.unwrap_err();
        assert!(matches!(err, ParlanteError::Exhausted { ref attempts } if attempts.is_empty()));
        assert!(err.to_string().contains("no configured provider"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let slow: Arc<dyn SpeechProvider> = Arc::new(Fixed {
            name: "slow",
            configured: true,
            outcome: Ok(()),
            delay: Duration::from_secs(60),
        });
        let err = synthesize_all(&[slow]).await.unwrap_err();
        let attempts = err.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].error.kind, ErrorKind::Transient);
        assert_eq!(attempts[0].error.code.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn non_provider_errors_are_recorded_as_unknown() {
        assert_eq!(
            to_provider_error(ParlanteError::InvalidInput("x".into())).kind,
            ErrorKind::Unknown
        );
    }
}
