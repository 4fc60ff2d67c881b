//! Caller-facing facade over the speech and reply paths.

use tracing::instrument;

use super::TutorBuilder;
use crate::Result;
use crate::orchestrator::{ConversationService, SpeechOrchestrator};
use crate::types::{HistoryEntry, Level, SpeechRequest, Synthesis, TutorReply, VoiceOptions};

/// The tutoring backend: speech synthesis with fallback and caching, and
/// tutor replies with a pre-filter, model chain and bounded history.
///
/// `Tutor` is `Send + Sync`; share it behind an `Arc`.
pub struct Tutor {
    speech: SpeechOrchestrator,
    conversation: ConversationService,
}

impl Tutor {
    /// Create a new builder for configuring the tutor.
    pub fn builder() -> TutorBuilder {
        TutorBuilder::new()
    }

    pub fn new(speech: SpeechOrchestrator, conversation: ConversationService) -> Self {
        Self {
            speech,
            conversation,
        }
    }

    pub fn speech(&self) -> &SpeechOrchestrator {
        &self.speech
    }

    pub fn conversation(&self) -> &ConversationService {
        &self.conversation
    }

    /// Synthesize `text`. Fails with
    /// [`Exhausted`](crate::ParlanteError::Exhausted) when every configured
    /// vendor fails, and with `InvalidInput` before any vendor is tried
    /// when the text is empty or too long.
    #[instrument(name = "tutor.synthesize", skip(self, text, options))]
    pub async fn synthesize(
        &self,
        text: &str,
        language: &str,
        options: VoiceOptions,
    ) -> Result<Synthesis> {
        let request = SpeechRequest::new(text, language, options)?;
        self.speech.resolve(&request).await
    }

    /// Like [`synthesize`](Self::synthesize), but answers with the Web
    /// Speech directive instead of failing when every vendor is down.
    pub async fn synthesize_or_degrade(
        &self,
        text: &str,
        language: &str,
        options: VoiceOptions,
    ) -> Result<Synthesis> {
        let request = SpeechRequest::new(text, language, options)?;
        self.speech.resolve_or_degrade(&request).await
    }

    /// Answer one learner message in `session`.
    pub async fn reply(
        &self,
        session: &str,
        message: &str,
        topic: &str,
        level: Level,
    ) -> Result<TutorReply> {
        self.conversation.reply(session, message, topic, level).await
    }

    /// Start over: forget the session's history.
    pub async fn start_session(&self, session: &str) -> Result<()> {
        self.conversation.start_session(session).await
    }

    /// Current history for `session`, oldest first.
    pub async fn history(&self, session: &str) -> Result<Vec<HistoryEntry>> {
        self.conversation.history().get(session).await
    }
}

impl std::fmt::Debug for Tutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tutor")
            .field("speech_providers", &self.speech.provider_names())
            .field("reply_models", &self.conversation.chain().model_names())
            .field("cache", &self.speech.cache().backend_type())
            .finish()
    }
}
