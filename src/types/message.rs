//! Conversation types: history entries, reply requests and tutor replies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ParlanteError, Result};

/// Longest accepted learner message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2_000;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create a learner message stamped now
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a tutor message stamped now
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Learner proficiency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ParlanteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "a1" | "a2" => Ok(Level::Beginner),
            "intermediate" | "b1" | "b2" => Ok(Level::Intermediate),
            "advanced" | "c1" | "c2" => Ok(Level::Advanced),
            other => Err(ParlanteError::InvalidInput(format!("unknown level '{other}'"))),
        }
    }
}

/// Everything a reply model needs for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    /// Prior turns, oldest first. Does not include `message`.
    pub history: Vec<HistoryEntry>,
    pub message: String,
    pub topic: String,
    pub level: Level,
}

impl ReplyRequest {
    /// Validate and build a request. The message and topic are trimmed.
    pub fn new(
        history: Vec<HistoryEntry>,
        message: impl AsRef<str>,
        topic: impl AsRef<str>,
        level: Level,
    ) -> Result<Self> {
        let message = message.as_ref().trim();
        if message.is_empty() {
            return Err(ParlanteError::InvalidInput("message is empty".into()));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ParlanteError::InvalidInput(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let topic = match topic.as_ref().trim() {
            "" => "conversación libre",
            t => t,
        };
        Ok(Self {
            history,
            message: message.to_string(),
            topic: topic.to_string(),
            level,
        })
    }
}

/// A tutor's answer to one learner message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorReply {
    pub text: String,
    /// Corrected version of the learner's message, when it had mistakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Model name, or `"grammar"` for pre-filter replies.
    pub served_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_request_defaults_topic() {
        let req = ReplyRequest::new(vec![], " hola ", "  ", Level::Beginner).unwrap();
        assert_eq!(req.message, "hola");
        assert_eq!(req.topic, "conversación libre");
    }

    #[test]
    fn reply_request_rejects_empty_message() {
        let err = ReplyRequest::new(vec![], "\n", "comida", Level::Beginner).unwrap_err();
        assert!(matches!(err, ParlanteError::InvalidInput(_)));
    }

    #[test]
    fn level_parses_cefr() {
        assert_eq!("B1".parse::<Level>().unwrap(), Level::Intermediate);
        assert_eq!("advanced".parse::<Level>().unwrap(), Level::Advanced);
    }

    #[test]
    fn history_entry_roundtrips_role() {
        let entry = HistoryEntry::assistant("¡Hola!");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
