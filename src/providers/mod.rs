//! Vendor adapters.
//!
//! Speech: [`ElevenLabsProvider`], [`PollyProvider`], [`GoogleTtsProvider`]
//! and the always-available [`WebSpeechProvider`]. Replies:
//! [`LlmReplyModel`] over the llm crate. Each adapter maps its vendor's
//! failures onto [`ErrorKind`](crate::ErrorKind).

pub mod elevenlabs;
pub mod google_tts;
pub mod llm_reply;
pub mod polly;
pub mod retry;
pub mod traits;
pub mod voices;
pub mod web_speech;

pub use elevenlabs::ElevenLabsProvider;
pub use google_tts::GoogleTtsProvider;
pub use llm_reply::{DEFAULT_GEMINI_MODELS, DEFAULT_OPENAI_MODEL, LlmReplyModel};
pub use polly::{AwsCredentials, PollyProvider};
pub use retry::{RetryConfig, RetryingReplyModel, RetryingSpeechProvider};
pub use traits::{ReplyModel, SpeechProvider};
pub use voices::{Voice, VoiceTable};
pub use web_speech::{SpeechDirective, WebSpeechProvider};

/// Longest vendor error body carried into an error message.
const ERROR_EXCERPT_CHARS: usize = 200;

/// Normalize an optional credential: trimmed, and `None` when blank.
pub(crate) fn credential(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First few hundred characters of an error body.
pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    body.chars().take(ERROR_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rejects_blank() {
        assert_eq!(credential(None), None);
        assert_eq!(credential(Some("   ".into())), None);
        assert_eq!(credential(Some(" key ".into())), Some("key".into()));
    }

    #[test]
    fn excerpt_truncates() {
        let long = "x".repeat(1_000);
        assert_eq!(excerpt(&long).len(), ERROR_EXCERPT_CHARS);
        assert_eq!(excerpt(""), "empty response body");
    }
}
