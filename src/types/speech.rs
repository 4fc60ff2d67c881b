//! Speech synthesis request and result types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ParlanteError, Result};

/// Longest text accepted for a single synthesis request, in characters.
pub const MAX_TEXT_CHARS: usize = 5_000;

/// Content type of the browser speech directive.
pub const WEB_SPEECH_CONTENT_TYPE: &str = "application/vnd.parlante.web-speech+json";

/// A normalized language tag such as `es`, `es-mx` or `en-us`.
///
/// Normalization trims whitespace, lowercases, and turns `_` into `-`, so
/// `"es_MX"` and `" es-mx "` are the same language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Language(String);

impl Language {
    pub fn new(tag: impl AsRef<str>) -> Self {
        let tag = tag.as_ref().trim().to_lowercase().replace('_', "-");
        if tag.is_empty() {
            return Self::default();
        }
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary subtag: `es-mx` → `es`.
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl Default for Language {
    fn default() -> Self {
        Self("es".to_string())
    }
}

impl From<String> for Language {
    fn from(s: String) -> Self {
        Language::new(s)
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        Language::new(s)
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested voice gender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Female,
    Male,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = ParlanteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "female" | "f" => Ok(Gender::Female),
            "male" | "m" => Ok(Gender::Male),
            other => Err(ParlanteError::InvalidInput(format!("unknown gender '{other}'"))),
        }
    }
}

/// Optional voice hints attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOptions {
    #[serde(default)]
    pub gender: Gender,
    /// Vendor voice id/name overriding the voice table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Provider to try first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl VoiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// An immutable, validated synthesis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    text: String,
    language: Language,
    options: VoiceOptions,
}

impl SpeechRequest {
    /// Validate and build a request.
    ///
    /// Text is trimmed; empty or oversized text is rejected with
    /// [`ParlanteError::InvalidInput`].
    pub fn new(
        text: impl AsRef<str>,
        language: impl Into<Language>,
        options: VoiceOptions,
    ) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(ParlanteError::InvalidInput("text is empty".into()));
        }
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(ParlanteError::InvalidInput(format!(
                "text is {chars} characters, limit is {MAX_TEXT_CHARS}"
            )));
        }
        let options = VoiceOptions {
            voice: options.voice.filter(|v| !v.trim().is_empty()),
            provider: options
                .provider
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty()),
            ..options
        };
        Ok(Self {
            text: text.to_string(),
            language: language.into(),
            options,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn gender(&self) -> Gender {
        self.options.gender
    }

    pub fn voice(&self) -> Option<&str> {
        self.options.voice.as_deref()
    }

    pub fn preferred_provider(&self) -> Option<&str> {
        self.options.provider.as_deref()
    }
}

/// Audio (or directive) produced by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechArtifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Adapter that originally produced the payload.
    pub provider: String,
}

impl SpeechArtifact {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            provider: provider.into(),
        }
    }

    /// Whether this is a browser speech directive rather than audio.
    pub fn is_directive(&self) -> bool {
        self.content_type == WEB_SPEECH_CONTENT_TYPE
    }
}

/// Caller-facing synthesis result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub artifact: SpeechArtifact,
    /// `"cache"` on a cache hit, otherwise the adapter name.
    pub served_by: String,
}

impl Synthesis {
    pub fn bytes(&self) -> &[u8] {
        &self.artifact.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.artifact.content_type
    }

    pub fn from_cache(&self) -> bool {
        self.served_by == crate::cache::CACHE_PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_normalizes() {
        assert_eq!(Language::new(" es_MX ").as_str(), "es-mx");
        assert_eq!(Language::new("ES").primary(), "es");
        assert_eq!(Language::new("es-mx").primary(), "es");
        assert_eq!(Language::new("  ").as_str(), "es");
    }

    #[test]
    fn request_rejects_empty_text() {
        let err = SpeechRequest::new("   ", "es", VoiceOptions::default()).unwrap_err();
        assert!(matches!(err, ParlanteError::InvalidInput(_)));
    }

    #[test]
    fn request_rejects_oversized_text() {
        let text = "a".repeat(MAX_TEXT_CHARS + 1);
        let err = SpeechRequest::new(text, "es", VoiceOptions::default()).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn request_trims_and_normalizes_hints() {
        let req = SpeechRequest::new(
            "  Hola  ",
            "es",
            VoiceOptions::new().voice("  ").provider(" Polly "),
        )
        .unwrap();
        assert_eq!(req.text(), "Hola");
        assert_eq!(req.voice(), None);
        assert_eq!(req.preferred_provider(), Some("polly"));
        assert_eq!(req.gender(), Gender::Female);
    }

    #[test]
    fn gender_parses() {
        assert_eq!("Male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("f".parse::<Gender>().unwrap(), Gender::Female);
        assert!("robot".parse::<Gender>().is_err());
    }
}
