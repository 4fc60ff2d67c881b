//! Public request, result and history types

pub mod message;
pub mod speech;

pub use message::{HistoryEntry, Level, MAX_MESSAGE_CHARS, ReplyRequest, Role, TutorReply};
pub use speech::{
    Gender, Language, MAX_TEXT_CHARS, SpeechArtifact, SpeechRequest, Synthesis, VoiceOptions,
    WEB_SPEECH_CONTENT_TYPE,
};
