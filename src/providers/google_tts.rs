//! Google Cloud Text-to-Speech client (REST, API key auth).
//!
//! See: <https://cloud.google.com/text-to-speech/docs/reference/rest/v1/text/synthesize>

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::traits::SpeechProvider;
use super::voices::VoiceTable;
use super::{credential, excerpt};
use crate::types::{Gender, SpeechArtifact, SpeechRequest};
use crate::{ErrorKind, ProviderError, Result};

/// Adapter name.
pub const NAME: &str = "google-tts";

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

#[derive(Clone)]
pub struct GoogleTtsProvider {
    api_key: Option<String>,
    http: Client,
    base_url: String,
    voices: VoiceTable,
    speaking_rate: f32,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: Input<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct Input<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleError {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

impl GoogleTtsProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: credential(api_key),
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            voices: VoiceTable::google(),
            speaking_rate: 0.9,
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

    /// Speaking rate, 0.25–4.0. Default 0.9, slightly slow for learners.
    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = rate.clamp(0.25, 4.0);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Map a Google error envelope onto a provider error.
///
/// An invalid key comes back as 400 with reason `API_KEY_INVALID`, which is
/// a configuration problem rather than a bad request.
pub(crate) fn classify_error(status: u16, body: &str) -> ProviderError {
    let error = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error);
    let google_status = error.as_ref().and_then(|e| e.status.clone());
    let key_invalid = error.as_ref().is_some_and(|e| {
        e.details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"))
    });
    let message = error
        .and_then(|e| e.message)
        .unwrap_or_else(|| excerpt(body));

    let kind = match google_status.as_deref() {
        Some("RESOURCE_EXHAUSTED") => ErrorKind::RateLimited,
        Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => ErrorKind::Misconfigured,
        _ if key_invalid => ErrorKind::Misconfigured,
        _ => ErrorKind::from_status(status),
    };
    let code = google_status.unwrap_or_else(|| status.to_string());
    ProviderError::new(kind, message).with_code(code)
}

#[async_trait]
impl SpeechProvider for GoogleTtsProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(name = "google_tts.synthesize", skip(self, request), fields(language = %request.language()))]
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::misconfigured("GOOGLE_TTS_API_KEY not set"))?;
        let voice = self.voices.select(request).ok_or_else(|| {
            ProviderError::misconfigured(format!("no voice for {}", request.language()))
        })?;

        let body = SynthesizeBody {
            input: Input {
                text: request.text(),
            },
            voice: VoiceSelection {
                language_code: &voice.locale,
                name: &voice.id,
                ssml_gender: match request.gender() {
                    Gender::Female => "FEMALE",
                    Gender::Male => "MALE",
                },
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: self.speaking_rate,
            },
        };

        let url = format!("{}/v1/text:synthesize", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body).into());
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unknown(format!("malformed response: {e}")))?;
        let encoded = parsed
            .audio_content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::unknown("response has no audioContent"))?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ProviderError::unknown(format!("audioContent is not base64: {e}")))?;

        Ok(SpeechArtifact::new(bytes, "audio/mpeg", NAME))
    }
}
