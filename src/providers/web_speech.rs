//! Client-side speech directive.
//!
//! Does no synthesis. Produces a small JSON document telling the browser to
//! speak the text itself with the Web Speech API, which costs nothing and is
//! always available.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::SpeechProvider;
use super::voices::VoiceTable;
use crate::Result;
use crate::types::{Gender, SpeechArtifact, SpeechRequest, WEB_SPEECH_CONTENT_TYPE};

/// Adapter name.
pub const NAME: &str = "web-speech";

/// Browser-side speech instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechDirective {
    pub engine: String,
    pub text: String,
    /// BCP-47 locale for `SpeechSynthesisUtterance.lang`.
    pub lang: String,
    pub gender: Gender,
    pub rate: f32,
    pub pitch: f32,
}

impl SpeechDirective {
    /// Parse a directive back out of an artifact.
    pub fn from_artifact(artifact: &SpeechArtifact) -> Result<Self> {
        Ok(serde_json::from_slice(&artifact.bytes)?)
    }
}

#[derive(Clone)]
pub struct WebSpeechProvider {
    locales: VoiceTable,
    rate: f32,
}

impl Default for WebSpeechProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSpeechProvider {
    pub fn new() -> Self {
        Self {
            locales: VoiceTable::web_speech(),
            rate: 0.9,
        }
    }

    /// Utterance rate, 0.1–10. Default 0.9.
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate.clamp(0.1, 10.0);
        self
    }

    pub fn with_locales(mut self, locales: VoiceTable) -> Self {
        self.locales = locales;
        self
    }

    /// Build the directive for a request without going through the trait.
    pub fn directive(&self, request: &SpeechRequest) -> SpeechDirective {
        let lang = self
            .locales
            .resolve(request.language(), request.gender())
            .map(|v| v.locale.clone())
            .unwrap_or_else(|| request.language().to_string());
        SpeechDirective {
            engine: NAME.to_string(),
            text: request.text().to_string(),
            lang,
            gender: request.gender(),
            rate: self.rate,
            pitch: 1.0,
        }
    }
}

#[async_trait]
impl SpeechProvider for WebSpeechProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechArtifact> {
        let bytes = serde_json::to_vec(&self.directive(request))?;
        Ok(SpeechArtifact::new(bytes, WEB_SPEECH_CONTENT_TYPE, NAME))
    }
}
