//! Table-driven voice selection.
//!
//! Each vendor ships a [`VoiceTable`] mapping `language → gender → voice`.
//! Lookup tries the full tag (`es-mx`), then the primary subtag (`es`), then
//! the table's default language; within a language a missing gender falls
//! back to the female voice. An explicit voice on the request wins over the
//! table but keeps the table's locale.

use std::collections::HashMap;

use crate::types::{Gender, Language, SpeechRequest};

/// A vendor voice and the locale it speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Vendor voice identifier (ElevenLabs voice id, Polly `VoiceId`, Google
    /// voice name, ...).
    pub id: String,
    /// Vendor locale code, e.g. `es-ES`.
    pub locale: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            locale: locale.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoiceTable {
    default_language: String,
    entries: HashMap<String, HashMap<Gender, Voice>>,
}

impl VoiceTable {
    /// An empty table. `default_language` is used when a request's language
    /// has no entry.
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: Language::new(default_language.into()).as_str().to_string(),
            entries: HashMap::new(),
        }
    }

    /// Add (or replace) a voice.
    pub fn with(
        mut self,
        language: &str,
        gender: Gender,
        id: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        self.entries
            .entry(Language::new(language).as_str().to_string())
            .or_default()
            .insert(gender, Voice::new(id, locale));
        self
    }

    /// Look up a voice by language and gender.
    pub fn resolve(&self, language: &Language, gender: Gender) -> Option<&Voice> {
        let voices = self
            .entries
            .get(language.as_str())
            .or_else(|| self.entries.get(language.primary()))
            .or_else(|| self.entries.get(&self.default_language))?;
        voices.get(&gender).or_else(|| voices.get(&Gender::Female))
    }

    /// Voice for a request, honoring an explicit voice override.
    pub fn select(&self, request: &SpeechRequest) -> Option<Voice> {
        let resolved = self.resolve(request.language(), request.gender());
        match request.voice() {
            Some(id) => {
                let locale = resolved
                    .map(|v| v.locale.clone())
                    .unwrap_or_else(|| request.language().to_string());
                Some(Voice::new(id, locale))
            }
            None => resolved.cloned(),
        }
    }

    /// Default ElevenLabs voices (multilingual model, so locale is advisory).
    pub fn elevenlabs() -> Self {
        Self::new("es")
            .with("es", Gender::Female, "EXAVITQu4vr4xnSDxMaL", "es")
            .with("es", Gender::Male, "pNInz6obpgDQGcFmaJgB", "es")
            .with("en", Gender::Female, "21m00Tcm4TlvDq8ikWAM", "en")
            .with("en", Gender::Male, "ErXwobaYiN019PkySvjV", "en")
    }

    /// Default Amazon Polly neural voices.
    pub fn polly() -> Self {
        Self::new("es")
            .with("es", Gender::Female, "Lucia", "es-ES")
            .with("es", Gender::Male, "Sergio", "es-ES")
            .with("es-mx", Gender::Female, "Mia", "es-MX")
            .with("es-mx", Gender::Male, "Andres", "es-MX")
            .with("es-us", Gender::Female, "Lupe", "es-US")
            .with("es-us", Gender::Male, "Pedro", "es-US")
            .with("en", Gender::Female, "Joanna", "en-US")
            .with("en", Gender::Male, "Matthew", "en-US")
    }

    /// Default Google Cloud TTS voices.
    pub fn google() -> Self {
        Self::new("es")
            .with("es", Gender::Female, "es-ES-Neural2-A", "es-ES")
            .with("es", Gender::Male, "es-ES-Neural2-B", "es-ES")
            .with("es-us", Gender::Female, "es-US-Neural2-A", "es-US")
            .with("es-us", Gender::Male, "es-US-Neural2-B", "es-US")
            .with("en", Gender::Female, "en-US-Neural2-F", "en-US")
            .with("en", Gender::Male, "en-US-Neural2-D", "en-US")
    }

    /// Browser locales for the Web Speech directive. The id is the locale.
    pub fn web_speech() -> Self {
        Self::new("es")
            .with("es", Gender::Female, "es-ES", "es-ES")
            .with("es-mx", Gender::Female, "es-MX", "es-MX")
            .with("es-us", Gender::Female, "es-US", "es-US")
            .with("en", Gender::Female, "en-US", "en-US")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoiceOptions;

    #[test]
    fn exact_tag_beats_primary_subtag() {
        let table = VoiceTable::polly();
        let voice = table.resolve(&Language::new("es-MX"), Gender::Male).unwrap();
        assert_eq!(voice.id, "Andres");
        let voice = table.resolve(&Language::new("es-AR"), Gender::Male).unwrap();
        assert_eq!(voice.id, "Sergio");
    }

    #[test]
    fn missing_gender_falls_back_to_female() {
        let table = VoiceTable::web_speech();
        let voice = table.resolve(&Language::new("es"), Gender::Male).unwrap();
        assert_eq!(voice.id, "es-ES");
    }

    #[test]
    fn unknown_language_uses_default() {
        let table = VoiceTable::google();
        let voice = table.resolve(&Language::new("fr"), Gender::Female).unwrap();
        assert_eq!(voice.id, "es-ES-Neural2-A");
    }

    #[test]
    fn explicit_voice_overrides_table() {
        let table = VoiceTable::polly();
        let request =
            SpeechRequest::new("Hola", "es-mx", VoiceOptions::new().voice("Conchita")).unwrap();
        let voice = table.select(&request).unwrap();
        assert_eq!(voice.id, "Conchita");
        assert_eq!(voice.locale, "es-MX");
    }

    #[test]
    fn empty_table_has_no_voice() {
        let table = VoiceTable::new("es");
        assert!(table.resolve(&Language::new("es"), Gender::Female).is_none());
    }
}
