//! Tutor reply path: pre-filter, breaker-guarded model chain, history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use super::chain;
use super::speech::DEFAULT_ATTEMPT_TIMEOUT;
use crate::Result;
use crate::breaker::CircuitBreaker;
use crate::grammar::GrammarFilter;
use crate::history::ConversationHistory;
use crate::providers::ReplyModel;
use crate::types::{HistoryEntry, Level, ReplyRequest, TutorReply};

/// Ordered list of reply models, tried one after another.
pub struct ReplyChain {
    models: Vec<Arc<dyn ReplyModel>>,
    attempt_timeout: Duration,
}

impl ReplyChain {
    pub fn new(models: Vec<Arc<dyn ReplyModel>>) -> Self {
        Self {
            models,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Model names in priority order.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name()).collect()
    }

    /// First successful reply wins; `served_by` names the model that wrote it.
    pub async fn generate(&self, request: &ReplyRequest) -> Result<TutorReply> {
        let served = chain::run("reply", &self.models, self.attempt_timeout, |m| async move {
            m.generate(request).await
        })
        .await?;
        Ok(TutorReply {
            served_by: served.provider,
            ..served.value
        })
    }
}

/// One learner/tutor exchange at a time, per session.
///
/// # Flow
///
/// 1. validate the message and load prior history
/// 2. append the learner's message
/// 3. grammar pre-filter; a match answers without touching any model
/// 4. otherwise the chain runs behind the circuit breaker
/// 5. append the tutor's reply
///
/// The learner's message stays in history even when step 4 fails.
pub struct ConversationService {
    history: Arc<ConversationHistory>,
    grammar: GrammarFilter,
    breaker: Arc<CircuitBreaker>,
    chain: ReplyChain,
}

impl ConversationService {
    pub fn new(
        history: Arc<ConversationHistory>,
        grammar: GrammarFilter,
        breaker: Arc<CircuitBreaker>,
        chain: ReplyChain,
    ) -> Self {
        Self {
            history,
            grammar,
            breaker,
            chain,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn chain(&self) -> &ReplyChain {
        &self.chain
    }

    #[instrument(name = "conversation.reply", skip(self, message, topic), fields(level = level.as_str()))]
    pub async fn reply(
        &self,
        session: &str,
        message: &str,
        topic: &str,
        level: Level,
    ) -> Result<TutorReply> {
        let start = Instant::now();
        let prior = self.history.get(session).await?;
        let request = ReplyRequest::new(prior, message, topic, level)?;
        self.history
            .append(session, HistoryEntry::user(&request.message))
            .await?;

        let reply = match self.grammar.check(&request.message) {
            Some(reply) => {
                debug!("answered by grammar pre-filter");
                chain::record_request("reply", &reply.served_by, start, true);
                reply
            }
            None => {
                self.breaker
                    .guard(|| self.chain.generate(&request))
                    .await?
            }
        };

        self.history
            .append(session, HistoryEntry::assistant(&reply.text))
            .await?;
        info!(served_by = %reply.served_by, "tutor replied");
        Ok(reply)
    }

    /// Begin a fresh conversation for `session`.
    pub async fn start_session(&self, session: &str) -> Result<()> {
        self.history.reset(session).await
    }
}
