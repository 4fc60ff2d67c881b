//! ElevenLabs text-to-speech client.
//!
//! See: <https://elevenlabs.io/docs/api-reference/text-to-speech>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::traits::SpeechProvider;
use super::voices::VoiceTable;
use super::{credential, excerpt};
use crate::types::{SpeechArtifact, SpeechRequest};
use crate::{ErrorKind, ProviderError, Result};

/// Adapter name.
pub const NAME: &str = "elevenlabs";

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Client for the ElevenLabs synthesis endpoint.
#[derive(Clone)]
pub struct ElevenLabsProvider {
    api_key: Option<String>,
    http: Client,
    base_url: String,
    model_id: String,
    voices: VoiceTable,
    timeout: Duration,
}

#[derive(Serialize)]
struct SynthesisBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    status: Option<String>,
    message: Option<String>,
}

impl ElevenLabsProvider {
    /// Create a client. `None` or an empty key leaves it unconfigured.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: credential(api_key),
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            voices: VoiceTable::elevenlabs(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point at a different host (for testing with wiremock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_voices(mut self, voices: VoiceTable) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Map an ElevenLabs error response onto a provider error.
///
/// Quota exhaustion arrives as 401 with `detail.status = "quota_exceeded"`
/// (or as 402 on some plans) and is treated as rate limiting.
pub(crate) fn classify_error(status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);
    let detail_status = detail.as_ref().and_then(|d| d.status.clone());
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| excerpt(body));

    match (status, detail_status.as_deref()) {
        (402, _) | (401, Some("quota_exceeded")) => ProviderError::rate_limited(message)
            .with_code(detail_status.clone().unwrap_or_else(|| status.to_string())),
        (_, Some(code)) => ProviderError::new(ErrorKind::from_status(status), message).with_code(code),
        _ => ProviderError::from_status(status, message),
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(name = "elevenlabs.synthesize", skip(self, request), fields(language = %request.language()))]
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::misconfigured("ELEVENLABS_API_KEY not set"))?;
        let voice = self.voices.select(request).ok_or_else(|| {
            ProviderError::misconfigured(format!("no voice for {}", request.language()))
        })?;

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice.id);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header("xi-api-key", api_key)
            .header("accept", "audio/mpeg")
            .json(&SynthesisBody {
                text: request.text(),
                model_id: &self.model_id,
                voice_settings: VoiceSettings {
                    stability: 0.5,
                    similarity_boost: 0.75,
                },
            })
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body).into());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        if !content_type.starts_with("audio/") {
            return Err(ProviderError::unknown(format!(
                "expected audio, got content type {content_type}"
            ))
            .into());
        }

        let bytes = response.bytes().await.map_err(ProviderError::from)?;
        if bytes.is_empty() {
            return Err(ProviderError::unknown("empty audio body").into());
        }

        Ok(SpeechArtifact::new(bytes.to_vec(), content_type, NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_is_rate_limited() {
        let body = r#"{"detail":{"status":"quota_exceeded","message":"This request exceeds your quota."}}"#;
        let err = classify_error(401, body);
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.code.as_deref(), Some("quota_exceeded"));
        assert!(err.message.contains("quota"));
    }

    #[test]
    fn plain_401_is_misconfigured() {
        let body = r#"{"detail":{"status":"invalid_api_key","message":"Invalid API key"}}"#;
        assert_eq!(classify_error(401, body).kind, ErrorKind::Misconfigured);
    }

    #[test]
    fn payment_required_is_rate_limited() {
        assert_eq!(classify_error(402, "").kind, ErrorKind::RateLimited);
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_error(503, "upstream unavailable");
        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.code.as_deref(), Some("503"));
    }

    #[test]
    fn unconfigured_without_key() {
        assert!(!ElevenLabsProvider::new(None).is_configured());
        assert!(!ElevenLabsProvider::new(Some("  ".into())).is_configured());
        assert!(ElevenLabsProvider::new(Some("xi-key".into())).is_configured());
    }
}
