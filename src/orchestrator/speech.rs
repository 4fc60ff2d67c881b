//! Speech fallback orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::chain::{self, Served};
use crate::cache::{CACHE_PROVIDER, CacheFingerprint, ContentAddressedCache};
use crate::providers::{SpeechProvider, WebSpeechProvider};
use crate::types::{Gender, SpeechRequest, Synthesis};
use crate::{ParlanteError, Result};

/// Default per-adapter time budget.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves a [`SpeechRequest`] to audio: cache first, then paid vendors in
/// priority order, caching the first success.
///
/// # Local routing
///
/// Requests whose gender is in `local_genders` (default: male) skip the paid
/// vendors and are answered by the local provider (the Web Speech
/// directive). Those results are never cached, so changing the policy takes
/// effect immediately.
pub struct SpeechOrchestrator {
    cache: ContentAddressedCache,
    providers: Vec<Arc<dyn SpeechProvider>>,
    local: Arc<dyn SpeechProvider>,
    local_genders: Vec<Gender>,
    attempt_timeout: Duration,
}

impl SpeechOrchestrator {
    /// Create an orchestrator over `providers`, highest priority first.
    pub fn new(cache: ContentAddressedCache, providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        Self {
            cache,
            providers,
            local: Arc::new(WebSpeechProvider::new()),
            local_genders: vec![Gender::Male],
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Replace the local (directive) provider.
    pub fn with_local(mut self, local: Arc<dyn SpeechProvider>) -> Self {
        self.local = local;
        self
    }

    /// Genders routed straight to the local provider. Empty disables
    /// local routing.
    pub fn with_local_genders(mut self, genders: Vec<Gender>) -> Self {
        self.local_genders = genders;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub fn cache(&self) -> &ContentAddressedCache {
        &self.cache
    }

    /// Names of the registered paid providers, in priority order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Candidate order for a request: registration order, with the
    /// preferred provider (if registered) moved to the front.
    fn candidates(&self, preferred: Option<&str>) -> Vec<Arc<dyn SpeechProvider>> {
        let mut candidates = self.providers.clone();
        if let Some(name) = preferred
            && let Some(pos) = candidates.iter().position(|p| p.name() == name)
        {
            let hinted = candidates.remove(pos);
            candidates.insert(0, hinted);
        }
        candidates
    }

    /// Resolve a request.
    ///
    /// Returns `served_by = "cache"` on a hit. When every configured vendor
    /// fails (or none is configured) returns [`ParlanteError::Exhausted`]
    /// naming each attempt.
    #[instrument(
        name = "speech.resolve",
        skip(self, request),
        fields(language = %request.language(), gender = request.gender().as_str())
    )]
    pub async fn resolve(&self, request: &SpeechRequest) -> Result<Synthesis> {
        let start = Instant::now();
        let fingerprint = CacheFingerprint::of(request);

        if let Some(artifact) = self.cache.get(&fingerprint).await {
            chain::record_request("synthesize", CACHE_PROVIDER, start, true);
            return Ok(Synthesis {
                artifact,
                served_by: CACHE_PROVIDER.to_string(),
            });
        }

        if self.local_genders.contains(&request.gender()) {
            debug!(provider = self.local.name(), "routing to local provider");
            let served = self.run(std::slice::from_ref(&self.local), request).await?;
            return Ok(Synthesis {
                artifact: served.value,
                served_by: served.provider,
            });
        }

        let candidates = self.candidates(request.preferred_provider());
        let served = self.run(&candidates, request).await?;
        self.cache.put(&fingerprint, &served.value).await;
        info!(provider = %served.provider, %fingerprint, "synthesized");

        Ok(Synthesis {
            artifact: served.value,
            served_by: served.provider,
        })
    }

    /// Like [`resolve`](Self::resolve), but answers with the local
    /// directive when every vendor fails, so the caller always has
    /// something to play.
    pub async fn resolve_or_degrade(&self, request: &SpeechRequest) -> Result<Synthesis> {
        match self.resolve(request).await {
            Err(err @ ParlanteError::Exhausted { .. }) => {
                warn!(error = %err, "all speech providers failed, degrading to local");
                match self.local.synthesize(request).await {
                    Ok(artifact) => Ok(Synthesis {
                        served_by: self.local.name().to_string(),
                        artifact,
                    }),
                    Err(local_err) => {
                        warn!(error = %local_err, "local provider failed");
                        Err(err)
                    }
                }
            }
            other => other,
        }
    }

    async fn run(
        &self,
        candidates: &[Arc<dyn SpeechProvider>],
        request: &SpeechRequest,
    ) -> Result<Served<crate::types::SpeechArtifact>> {
        chain::run("synthesize", candidates, self.attempt_timeout, |p| async move {
            p.synthesize(request).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::web_speech;
    use crate::types::{SpeechArtifact, VoiceOptions};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl SpeechProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn synthesize(&self, _: &SpeechRequest) -> Result<SpeechArtifact> {
            Ok(SpeechArtifact::new(vec![0], "audio/mpeg", self.0))
        }
    }

    fn orchestrator() -> SpeechOrchestrator {
        SpeechOrchestrator::new(
            ContentAddressedCache::in_memory(),
            vec![
                Arc::new(Named("a")) as Arc<dyn SpeechProvider>,
                Arc::new(Named("b")),
            ],
        )
    }

    #[test]
    fn hint_moves_provider_to_front() {
        let orch = orchestrator();
        let names: Vec<_> = orch
            .candidates(Some("b"))
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);

        let names: Vec<_> = orch
            .candidates(Some("missing"))
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn male_voice_routes_locally_and_is_not_cached() {
        let orch = orchestrator();
        let request =
            SpeechRequest::new("Hola", "es", VoiceOptions::new().gender(Gender::Male)).unwrap();

        let first = orch.resolve(&request).await.unwrap();
        assert_eq!(first.served_by, web_speech::NAME);
        assert!(first.artifact.is_directive());

        let second = orch.resolve(&request).await.unwrap();
        assert_eq!(second.served_by, web_speech::NAME);
    }

    #[tokio::test]
    async fn local_routing_can_be_disabled() {
        let orch = orchestrator().with_local_genders(vec![]);
        let request =
            SpeechRequest::new("Hola", "es", VoiceOptions::new().gender(Gender::Male)).unwrap();
        assert_eq!(orch.resolve(&request).await.unwrap().served_by, "a");
    }

    #[tokio::test]
    async fn degrades_when_nothing_is_configured() {
        let orch = SpeechOrchestrator::new(ContentAddressedCache::in_memory(), vec![]);
        let request = SpeechRequest::new("Hola", "es", VoiceOptions::default()).unwrap();

        assert!(matches!(
            orch.resolve(&request).await,
            Err(ParlanteError::Exhausted { .. })
        ));
        let degraded = orch.resolve_or_degrade(&request).await.unwrap();
        assert_eq!(degraded.served_by, web_speech::NAME);
        assert!(degraded.artifact.is_directive());
    }
}
