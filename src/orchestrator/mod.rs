//! Orchestrators: the speech fallback path and the tutor reply path.
//!
//! Both run candidates through the same ordered loop in `chain`, which
//! records every failure and only surfaces an aggregate error once the
//! list is exhausted.

pub(crate) mod chain;
pub mod reply;
pub mod speech;

pub use reply::{ConversationService, ReplyChain};
pub use speech::{DEFAULT_ATTEMPT_TIMEOUT, SpeechOrchestrator};
