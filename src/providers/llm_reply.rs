//! llm crate wrapper implementing [`ReplyModel`].
//!
//! One [`LlmReplyModel`] per model in the reply chain. The tutor persona,
//! topic and level go in the system prompt; prior turns become chat
//! messages; the model is asked to answer with a small JSON object that is
//! parsed into a [`TutorReply`].

use async_trait::async_trait;
use llm::LLMProvider;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage as LlmMessage;
use serde::Deserialize;
use tracing::instrument;

use super::credential;
use super::traits::ReplyModel;
use crate::types::{HistoryEntry, Level, ReplyRequest, Role, TutorReply};
use crate::{ErrorKind, ProviderError, Result};

/// Gemini models tried first, in order.
pub const DEFAULT_GEMINI_MODELS: [&str; 3] =
    ["gemini-2.5-flash-lite", "gemini-2.0-flash", "gemini-1.5-flash"];

/// Final OpenAI model in the chain.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// A single chat model behind the llm crate.
pub struct LlmReplyModel {
    backend: LLMBackend,
    api_key: Option<String>,
    model: String,
    base_url: Option<String>,
    timeout_secs: u64,
    temperature: f32,
    max_tokens: u32,
}

/// Shape the model is asked to answer with.
#[derive(Deserialize)]
struct ReplyPayload {
    reply: String,
    #[serde(default)]
    correction: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl LlmReplyModel {
    pub fn new(backend: LLMBackend, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            backend,
            api_key: credential(api_key),
            model: model.into(),
            base_url: None,
            timeout_secs: 30,
            temperature: 0.7,
            max_tokens: 512,
        }
    }

    /// A Gemini model via the Google backend.
    pub fn gemini(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self::new(LLMBackend::Google, api_key, model)
    }

    /// An OpenAI chat model.
    pub fn openai(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self::new(LLMBackend::OpenAI, api_key, model)
    }

    /// Override the backend base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_provider(&self, api_key: &str, system: &str) -> Result<Box<dyn LLMProvider>> {
        let mut builder = LLMBuilder::new()
            .backend(self.backend.clone())
            .api_key(api_key)
            .model(&self.model)
            .timeout_seconds(self.timeout_secs)
            .system(system)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        if let Some(ref url) = self.base_url {
            builder = builder.base_url(url.clone());
        }
        builder
            .build()
            .map_err(|e| ProviderError::misconfigured(e.to_string()).into())
    }
}

/// System prompt for a tutoring turn.
pub(crate) fn system_prompt(topic: &str, level: Level) -> String {
    let register = match level {
        Level::Beginner => "Usa frases cortas y vocabulario muy sencillo.",
        Level::Intermediate => "Usa un español natural con vocabulario cotidiano.",
        Level::Advanced => "Usa un español rico y natural, con expresiones idiomáticas.",
    };
    format!(
        "Eres un tutor de español amable que conversa con un estudiante de nivel {level}. \
         El tema de la conversación es: {topic}. {register} \
         Responde siempre en español y mantén la conversación con una pregunta. \
         Si el último mensaje del estudiante tiene errores, corrígelo. \
         Contesta solo con un objeto JSON con esta forma: \
         {{\"reply\": string, \"correction\": string o null, \"suggestions\": [string]}}",
        level = level.as_str(),
    )
}

pub(crate) fn to_llm_messages(history: &[HistoryEntry], message: &str) -> Vec<LlmMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    for entry in history {
        let msg = match entry.role {
            Role::User => LlmMessage::user().content(entry.content.clone()).build(),
            Role::Assistant => LlmMessage::assistant().content(entry.content.clone()).build(),
        };
        messages.push(msg);
    }
    messages.push(LlmMessage::user().content(message.to_string()).build());
    messages
}

/// Classify an llm crate error by its message.
pub(crate) fn classify_error(message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    let kind = if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("quota")
        || lower.contains("resource_exhausted")
    {
        ErrorKind::RateLimited
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("authentication")
        || lower.contains("invalid api key")
        || lower.contains("api key not valid")
    {
        ErrorKind::Misconfigured
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("unavailable")
        || ["500", "502", "503", "504"].iter().any(|c| lower.contains(c))
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Unknown
    };
    ProviderError::new(kind, message)
}

/// Parse a model answer into a reply.
///
/// Tolerates a surrounding markdown code fence; anything that is not the
/// expected JSON object is an `Unknown` failure so the chain moves on.
pub(crate) fn parse_reply(raw: &str, served_by: &str) -> std::result::Result<TutorReply, ProviderError> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Err(ProviderError::unknown("model reply is not a JSON object")),
    };
    let payload: ReplyPayload = serde_json::from_str(body)
        .map_err(|e| ProviderError::unknown(format!("model reply is malformed: {e}")))?;
    let text = payload.reply.trim();
    if text.is_empty() {
        return Err(ProviderError::unknown("model reply is empty"));
    }
    Ok(TutorReply {
        text: text.to_string(),
        correction: payload
            .correction
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        suggestions: payload
            .suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        served_by: served_by.to_string(),
    })
}

#[async_trait]
impl ReplyModel for LlmReplyModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(name = "llm.reply", skip(self, request), fields(model = %self.model, history = request.history.len()))]
    async fn generate(&self, request: &ReplyRequest) -> Result<TutorReply> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::misconfigured(format!("no API key for {}", self.model)))?;
        let provider =
            self.build_provider(api_key, &system_prompt(&request.topic, request.level))?;
        let messages = to_llm_messages(&request.history, &request.message);

        let response = provider
            .chat(&messages)
            .await
            .map_err(|e| classify_error(&e.to_string()))?;
        let text = response.text().unwrap_or_default();

        Ok(parse_reply(&text, &self.model)?)
    }
}
