//! Parlante - resilient speech and tutor-reply gateway for language learning
//!
//! This crate is the backend core of a Spanish tutor. It provides two
//! paths, each tolerant of individual vendor failures:
//!
//! - **Speech**: a content-addressed artifact cache in front of ElevenLabs,
//!   Amazon Polly and Google Cloud TTS, tried in order. The first success
//!   is cached; when every vendor fails the caller can fall back to a Web
//!   Speech directive the browser renders itself.
//! - **Replies**: a regex grammar pre-filter, then a chain of Gemini models
//!   and OpenAI behind a rate-limit circuit breaker, with a bounded
//!   per-session history.
//!
//! # Example
//!
//! ```rust,no_run
//! use parlante::{Level, Tutor, VoiceOptions};
//!
//! #[tokio::main]
//! async fn main() -> parlante::Result<()> {
//!     let tutor = Tutor::builder()
//!         .google_tts("your-google-key")
//!         .gemini("your-gemini-key")
//!         .build()
//!         .await?;
//!
//!     let audio = tutor
//!         .synthesize("¡Hola! ¿Cómo estás?", "es", VoiceOptions::default())
//!         .await?;
//!     println!("{} bytes from {}", audio.bytes().len(), audio.served_by);
//!
//!     let reply = tutor
//!         .reply("session-1", "Yo querer comer pizza", "comida", Level::Beginner)
//!         .await?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! # Failure model
//!
//! Adapters normalize vendor failures to an [`ErrorKind`]. Orchestrators
//! record each failure and move on; callers only ever see success,
//! [`ParlanteError::Exhausted`] (naming every attempted provider),
//! [`ParlanteError::CircuitOpen`], or [`ParlanteError::InvalidInput`].

pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod grammar;
pub mod history;
pub mod orchestrator;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use breaker::{CircuitBreaker, Clock, TokioClock};
pub use cache::{
    ArtifactStore, CacheConfig, CacheFingerprint, ContentAddressedCache, FilesystemStore,
    MemoryStore,
};
pub use config::{Config, Secrets};
pub use error::{Attempt, ErrorKind, ParlanteError, ProviderError, Result};
pub use gateway::{Tutor, TutorBuilder};
pub use grammar::{GrammarFilter, GrammarRule};
pub use history::{ConversationHistory, HistoryBackend, MemoryHistoryBackend};
pub use orchestrator::{ConversationService, ReplyChain, SpeechOrchestrator};
pub use providers::{
    AwsCredentials, ElevenLabsProvider, GoogleTtsProvider, LlmReplyModel, PollyProvider,
    ReplyModel, RetryConfig, SpeechDirective, SpeechProvider, WebSpeechProvider,
};

// Re-export all types
pub use types::{
    Gender, HistoryEntry, Language, Level, ReplyRequest, Role, SpeechArtifact, SpeechRequest,
    Synthesis, TutorReply, VoiceOptions,
};
