//! Builder for configuring tutor instances

use std::sync::Arc;
use std::time::Duration;

use super::Tutor;
use crate::Result;
use crate::breaker::{CircuitBreaker, Clock, DEFAULT_COOLDOWN};
use crate::cache::{CacheConfig, ContentAddressedCache};
use crate::config::{Config, Secrets};
use crate::grammar::GrammarFilter;
use crate::history::{ConversationHistory, DEFAULT_WINDOW, HistoryBackend, MemoryHistoryBackend};
use crate::orchestrator::{ConversationService, DEFAULT_ATTEMPT_TIMEOUT, ReplyChain, SpeechOrchestrator};
use crate::providers::{
    AwsCredentials, DEFAULT_GEMINI_MODELS, DEFAULT_OPENAI_MODEL, ElevenLabsProvider,
    GoogleTtsProvider, LlmReplyModel, PollyProvider, ReplyModel, RetryConfig, RetryingReplyModel,
    RetryingSpeechProvider, SpeechProvider,
};
use crate::types::Gender;

/// Builder for configuring tutor instances.
///
/// Built-in speech vendors are tried in the order ElevenLabs, Polly,
/// Google; built-in reply models are the Gemini list followed by OpenAI.
/// Only vendors with credentials are registered. Extra providers added
/// with [`speech_provider`](Self::speech_provider) and
/// [`reply_model`](Self::reply_model) come after the built-ins.
pub struct TutorBuilder {
    elevenlabs_key: Option<String>,
    elevenlabs_url: Option<String>,
    aws_credentials: Option<AwsCredentials>,
    polly_endpoint: Option<String>,
    google_tts_key: Option<String>,
    google_tts_url: Option<String>,
    gemini_key: Option<String>,
    gemini_models: Vec<String>,
    gemini_url: Option<String>,
    openai_key: Option<String>,
    openai_model: String,
    openai_url: Option<String>,
    extra_speech: Vec<Arc<dyn SpeechProvider>>,
    extra_models: Vec<Arc<dyn ReplyModel>>,
    cache_config: CacheConfig,
    artifact_cache: Option<ContentAddressedCache>,
    history_backend: Option<Arc<dyn HistoryBackend>>,
    history_window: usize,
    grammar: GrammarFilter,
    breaker_cooldown: Duration,
    clock: Option<Arc<dyn Clock>>,
    retry: RetryConfig,
    attempt_timeout: Duration,
    reply_attempt_timeout: Duration,
    local_genders: Vec<Gender>,
}

impl TutorBuilder {
    pub fn new() -> Self {
        Self {
            elevenlabs_key: None,
            elevenlabs_url: None,
            aws_credentials: None,
            polly_endpoint: None,
            google_tts_key: None,
            google_tts_url: None,
            gemini_key: None,
            gemini_models: DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
            gemini_url: None,
            openai_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_url: None,
            extra_speech: Vec::new(),
            extra_models: Vec::new(),
            cache_config: CacheConfig::default(),
            artifact_cache: None,
            history_backend: None,
            history_window: DEFAULT_WINDOW,
            grammar: GrammarFilter::spanish(),
            breaker_cooldown: DEFAULT_COOLDOWN,
            clock: None,
            retry: RetryConfig::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            reply_attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            local_genders: vec![Gender::Male],
        }
    }

    /// Start from file configuration and loaded secrets.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        let mut builder = Self::new()
            .cache(config.cache.clone())
            .history_window(config.reply.history_window)
            .breaker_cooldown(Duration::from_secs(config.reply.breaker_cooldown_secs))
            .retry(config.retry.to_retry_config())
            .attempt_timeout(Duration::from_secs(config.speech.attempt_timeout_secs))
            .reply_attempt_timeout(Duration::from_secs(config.reply.attempt_timeout_secs))
            .local_genders(config.speech.local_genders.clone())
            .gemini_models(config.reply.gemini_models.clone())
            .openai_model(config.reply.openai_model.clone());

        if !config.reply.grammar_filter {
            builder = builder.grammar(GrammarFilter::empty());
        }

        builder.elevenlabs_key = secrets.api_key("elevenlabs");
        builder.google_tts_key = secrets.api_key("google_tts");
        builder.gemini_key = secrets.api_key("gemini");
        builder.openai_key = secrets.api_key("openai");
        builder.aws_credentials = secrets.aws_credentials();

        let endpoints = &config.endpoints;
        builder.elevenlabs_url = endpoints.elevenlabs.clone();
        builder.polly_endpoint = endpoints.polly.clone();
        builder.google_tts_url = endpoints.google_tts.clone();
        builder.gemini_url = endpoints.gemini.clone();
        builder.openai_url = endpoints.openai.clone();
        builder
    }

    /// Configure ElevenLabs (first speech vendor).
    pub fn elevenlabs(mut self, api_key: impl Into<String>) -> Self {
        self.elevenlabs_key = Some(api_key.into());
        self
    }

    pub fn elevenlabs_url(mut self, url: impl Into<String>) -> Self {
        self.elevenlabs_url = Some(url.into());
        self
    }

    /// Configure Amazon Polly (second speech vendor).
    pub fn polly(mut self, credentials: AwsCredentials) -> Self {
        self.aws_credentials = Some(credentials);
        self
    }

    /// Override the Polly endpoint (default: the regional AWS endpoint).
    pub fn polly_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.polly_endpoint = Some(endpoint.into());
        self
    }

    /// Configure Google Cloud TTS (third speech vendor).
    pub fn google_tts(mut self, api_key: impl Into<String>) -> Self {
        self.google_tts_key = Some(api_key.into());
        self
    }

    pub fn google_tts_url(mut self, url: impl Into<String>) -> Self {
        self.google_tts_url = Some(url.into());
        self
    }

    /// Configure the Gemini reply models.
    pub fn gemini(mut self, api_key: impl Into<String>) -> Self {
        self.gemini_key = Some(api_key.into());
        self
    }

    /// Replace the Gemini model list (tried in order).
    pub fn gemini_models(mut self, models: Vec<String>) -> Self {
        self.gemini_models = models;
        self
    }

    pub fn gemini_url(mut self, url: impl Into<String>) -> Self {
        self.gemini_url = Some(url.into());
        self
    }

    /// Configure the OpenAI reply model (last in the chain).
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.openai_key = Some(api_key.into());
        self
    }

    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.openai_model = model.into();
        self
    }

    pub fn openai_url(mut self, url: impl Into<String>) -> Self {
        self.openai_url = Some(url.into());
        self
    }

    /// Append a speech provider after the built-in vendors.
    pub fn speech_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.extra_speech.push(provider);
        self
    }

    /// Append a reply model after the built-in models.
    pub fn reply_model(mut self, model: Arc<dyn ReplyModel>) -> Self {
        self.extra_models.push(model);
        self
    }

    /// Artifact cache backend settings (default: in memory).
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Use an already-open artifact cache, ignoring [`cache`](Self::cache).
    pub fn artifact_cache(mut self, cache: ContentAddressedCache) -> Self {
        self.artifact_cache = Some(cache);
        self
    }

    pub fn history_backend(mut self, backend: Arc<dyn HistoryBackend>) -> Self {
        self.history_backend = Some(backend);
        self
    }

    /// Entries kept per session (default: 10).
    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Replace the grammar pre-filter. [`GrammarFilter::empty`] disables it.
    pub fn grammar(mut self, grammar: GrammarFilter) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = cooldown;
        self
    }

    /// Time source for the circuit breaker.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Retry policy for built-in vendors. [`RetryConfig::disabled`] turns
    /// retries off.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Per-attempt time budget for each speech vendor.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Per-attempt time budget for each reply model.
    pub fn reply_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.reply_attempt_timeout = timeout;
        self
    }

    /// Genders answered by the Web Speech directive (default: male).
    pub fn local_genders(mut self, genders: Vec<Gender>) -> Self {
        self.local_genders = genders;
        self
    }

    fn with_speech_retry(&self, provider: Arc<dyn SpeechProvider>) -> Arc<dyn SpeechProvider> {
        if self.retry.max_attempts > 1 {
            Arc::new(RetryingSpeechProvider::new(provider, self.retry.clone()))
        } else {
            provider
        }
    }

    fn with_reply_retry(&self, model: Arc<dyn ReplyModel>) -> Arc<dyn ReplyModel> {
        if self.retry.max_attempts > 1 {
            Arc::new(RetryingReplyModel::new(model, self.retry.clone()))
        } else {
            model
        }
    }

    fn speech_providers(&self) -> Vec<Arc<dyn SpeechProvider>> {
        let timeout = self.attempt_timeout;
        let mut providers: Vec<Arc<dyn SpeechProvider>> = Vec::new();

        let mut elevenlabs = ElevenLabsProvider::new(self.elevenlabs_key.clone()).with_timeout(timeout);
        if let Some(url) = &self.elevenlabs_url {
            elevenlabs = elevenlabs.with_base_url(url);
        }
        if elevenlabs.is_configured() {
            providers.push(self.with_speech_retry(Arc::new(elevenlabs)));
        }

        let mut polly = PollyProvider::new(self.aws_credentials.clone()).with_timeout(timeout);
        if let Some(endpoint) = &self.polly_endpoint {
            polly = polly.with_endpoint(endpoint);
        }
        if polly.is_configured() {
            providers.push(self.with_speech_retry(Arc::new(polly)));
        }

        let mut google = GoogleTtsProvider::new(self.google_tts_key.clone()).with_timeout(timeout);
        if let Some(url) = &self.google_tts_url {
            google = google.with_base_url(url);
        }
        if google.is_configured() {
            providers.push(self.with_speech_retry(Arc::new(google)));
        }

        providers.extend(self.extra_speech.iter().cloned());
        providers
    }

    fn reply_models(&self) -> Vec<Arc<dyn ReplyModel>> {
        let timeout_secs = self.reply_attempt_timeout.as_secs().max(1);
        let mut models: Vec<Arc<dyn ReplyModel>> = Vec::new();

        for name in &self.gemini_models {
            let mut model = LlmReplyModel::gemini(self.gemini_key.clone(), name).timeout_secs(timeout_secs);
            if let Some(url) = &self.gemini_url {
                model = model.base_url(url);
            }
            if model.is_configured() {
                models.push(self.with_reply_retry(Arc::new(model)));
            }
        }

        let mut openai = LlmReplyModel::openai(self.openai_key.clone(), &self.openai_model)
            .timeout_secs(timeout_secs);
        if let Some(url) = &self.openai_url {
            openai = openai.base_url(url);
        }
        if openai.is_configured() {
            models.push(self.with_reply_retry(Arc::new(openai)));
        }

        models.extend(self.extra_models.iter().cloned());
        models
    }

    /// Build the tutor. Opens the artifact cache (creating its directory
    /// when filesystem-backed).
    ///
    /// Having no configured vendor is not an error: speech then always
    /// degrades to the directive, and replies fail with an empty
    /// [`Exhausted`](crate::ParlanteError::Exhausted) unless the grammar
    /// pre-filter answers.
    pub async fn build(self) -> Result<Tutor> {
        let cache = match &self.artifact_cache {
            Some(cache) => cache.clone(),
            None => self.cache_config.open().await?,
        };

        let speech = SpeechOrchestrator::new(cache, self.speech_providers())
            .with_local_genders(self.local_genders.clone())
            .with_attempt_timeout(self.attempt_timeout);

        let backend = self
            .history_backend
            .clone()
            .unwrap_or_else(|| Arc::new(MemoryHistoryBackend::new()));
        let history = Arc::new(ConversationHistory::new(backend, self.history_window));

        let breaker = Arc::new(match &self.clock {
            Some(clock) => CircuitBreaker::with_clock(self.breaker_cooldown, Arc::clone(clock)),
            None => CircuitBreaker::new(self.breaker_cooldown),
        });

        let chain =
            ReplyChain::new(self.reply_models()).with_attempt_timeout(self.reply_attempt_timeout);
        let conversation = ConversationService::new(history, self.grammar.clone(), breaker, chain);

        Ok(Tutor::new(speech, conversation))
    }
}

impl Default for TutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_configured_vendors_are_registered() {
        let tutor = TutorBuilder::new()
            .google_tts("g-key")
            .elevenlabs("  ")
            .build()
            .await
            .unwrap();
        assert_eq!(tutor.speech().provider_names(), vec!["google-tts"]);
        assert!(tutor.conversation().chain().model_names().is_empty());
    }

    #[tokio::test]
    async fn reply_chain_order_is_gemini_then_openai() {
        let tutor = TutorBuilder::new()
            .gemini("gm-key")
            .openai("sk-key")
            .build()
            .await
            .unwrap();
        assert_eq!(
            tutor.conversation().chain().model_names(),
            vec![
                "gemini-2.5-flash-lite",
                "gemini-2.0-flash",
                "gemini-1.5-flash",
                "gpt-4o-mini"
            ]
        );
    }

    struct SlowModel;

    #[async_trait::async_trait]
    impl ReplyModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn generate(&self, _request: &crate::ReplyRequest) -> Result<crate::TutorReply> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(crate::TutorReply {
                text: "¡Hola!".into(),
                correction: None,
                suggestions: Vec::new(),
                served_by: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reply_timeout_comes_from_reply_section() {
        let config: Config = toml::from_str(
            r#"
            [speech]
            attempt_timeout_secs = 45

            [reply]
            attempt_timeout_secs = 2
            gemini_models = []
            grammar_filter = false
            "#,
        )
        .unwrap();
        let tutor = TutorBuilder::from_config(&config, &Secrets::default())
            .reply_model(Arc::new(SlowModel))
            .build()
            .await
            .unwrap();
        assert_eq!(tutor.speech().attempt_timeout(), Duration::from_secs(45));
        assert_eq!(
            tutor.conversation().chain().attempt_timeout(),
            Duration::from_secs(2)
        );

        let err = tutor
            .reply("s1", "Hola, ¿qué tal?", "saludos", crate::Level::Beginner)
            .await
            .unwrap_err();
        let slow = err.attempts().last().unwrap();
        assert_eq!(slow.provider, "slow");
        assert_eq!(slow.error.kind, crate::ErrorKind::Transient);
    }

    #[tokio::test]
    async fn from_config_applies_settings() {
        let config: Config = toml::from_str(
            r#"
            [reply]
            gemini_models = ["gemini-2.0-flash"]
            history_window = 4
            breaker_cooldown_secs = 5
            "#,
        )
        .unwrap();
        let secrets = Secrets {
            gemini: Some(crate::config::ApiKeySecret {
                api_key: "gm-key".into(),
            }),
            ..Default::default()
        };
        let tutor = TutorBuilder::from_config(&config, &secrets)
            .build()
            .await
            .unwrap();
        let conversation = tutor.conversation();
        assert_eq!(conversation.history().window(), 4);
        assert_eq!(conversation.breaker().cooldown(), Duration::from_secs(5));
        assert_eq!(conversation.chain().model_names()[0], "gemini-2.0-flash");
    }
}
