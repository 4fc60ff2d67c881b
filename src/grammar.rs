//! Local grammar pre-filter.
//!
//! A short, ordered list of regex rules for the mistakes beginners make
//! most often. When one matches the learner's message the tutor answers
//! with a canned explanation instead of calling a model. First match wins.
//!
//! Rule templates use `regex` replacement syntax (`${1}`, `${name}`):
//! `replacement` rewrites the matched span to produce the corrected
//! sentence, and `reply` is expanded against the same captures.

use regex::Regex;
use tracing::{debug, warn};

use crate::telemetry;
use crate::types::TutorReply;
use crate::{ParlanteError, Result};

/// `served_by` value for pre-filter replies.
pub const GRAMMAR_PROVIDER: &str = "grammar";

/// `(name, pattern, replacement, reply)`
const SPANISH_RULES: &[(&str, &str, &str, &str)] = &[
    (
        "yo-querer",
        r"(?i)\b(yo)\s+querer\b",
        "${1} quiero",
        "¡Casi! Con «yo» el verbo querer se conjuga: «yo quiero». ¿Qué más quieres hacer?",
    ),
    (
        "yo-tener",
        r"(?i)\b(yo)\s+tener\b",
        "${1} tengo",
        "¡Buen intento! Con «yo» se dice «tengo», no «tener». ¿Qué más tienes?",
    ),
    (
        "yo-ser",
        r"(?i)\b(yo)\s+ser\b",
        "${1} soy",
        "Con «yo» el verbo ser se conjuga «soy». Por ejemplo: «Yo soy estudiante».",
    ),
    (
        "yo-estar",
        r"(?i)\b(yo)\s+estar\b",
        "${1} estoy",
        "Con «yo» el verbo estar se conjuga «estoy». Por ejemplo: «Yo estoy bien».",
    ),
    (
        "yo-ir",
        r"(?i)\b(yo)\s+ir\b",
        "${1} voy",
        "Con «yo» el verbo ir se conjuga «voy». Por ejemplo: «Yo voy a la playa».",
    ),
    (
        "soy-estado",
        r"(?i)\bsoy\s+(cansad[oa]|enferm[oa]|preocupad[oa]|nervios[oa])\b",
        "estoy ${1}",
        "Para estados temporales usamos «estar»: «estoy ${1}». ¿Por qué estás ${1}?",
    ),
    (
        "masculino-en-a",
        r"(?i)\bla\s+(problema|día|mapa|idioma|tema|sistema)\b",
        "el ${1}",
        "Ojo: «${1}» es masculino aunque termine en -a. Se dice «el ${1}».",
    ),
    (
        "femenino-en-o",
        r"(?i)\bel\s+(mano|foto|moto|radio)\b",
        "la ${1}",
        "Ojo: «${1}» es femenino aunque termine en -o. Se dice «la ${1}».",
    ),
];

/// One pre-filter rule.
#[derive(Debug, Clone)]
pub struct GrammarRule {
    name: String,
    pattern: Regex,
    replacement: String,
    reply: String,
}

impl GrammarRule {
    /// Compile a rule. Invalid patterns are configuration errors.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
        reply: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let pattern = Regex::new(pattern).map_err(|e| {
            ParlanteError::Configuration(format!("grammar rule '{name}' has invalid pattern: {e}"))
        })?;
        Ok(Self {
            name,
            pattern,
            replacement: replacement.into(),
            reply: reply.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, message: &str) -> Option<TutorReply> {
        let captures = self.pattern.captures(message)?;
        let mut text = String::new();
        captures.expand(&self.reply, &mut text);
        let correction = self
            .pattern
            .replace(message, self.replacement.as_str())
            .into_owned();
        Some(TutorReply {
            text,
            correction: Some(correction),
            suggestions: Vec::new(),
            served_by: GRAMMAR_PROVIDER.to_string(),
        })
    }
}

/// Ordered rule list; first match wins.
#[derive(Debug, Clone, Default)]
pub struct GrammarFilter {
    rules: Vec<GrammarRule>,
}

impl GrammarFilter {
    /// A filter with no rules (never matches).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in rules for common beginner Spanish mistakes.
    pub fn spanish() -> Self {
        Self {
            rules: compile_table(SPANISH_RULES),
        }
    }

    /// Append a rule at the lowest priority.
    pub fn with_rule(mut self, rule: GrammarRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check a learner message. Returns a canned reply on the first match.
    pub fn check(&self, message: &str) -> Option<TutorReply> {
        self.rules.iter().find_map(|rule| {
            let reply = rule.apply(message)?;
            debug!(rule = rule.name(), "grammar pre-filter matched");
            metrics::counter!(telemetry::GRAMMAR_HITS_TOTAL, "rule" => rule.name().to_owned())
                .increment(1);
            Some(reply)
        })
    }
}

/// Compile a rule table, logging and skipping any rule that fails.
fn compile_table(table: &[(&str, &str, &str, &str)]) -> Vec<GrammarRule> {
    table
        .iter()
        .filter_map(|(name, pattern, replacement, reply)| {
            GrammarRule::new(*name, pattern, *replacement, *reply)
                .inspect_err(|e| warn!(rule = *name, error = %e, "dropping grammar rule"))
                .ok()
        })
        .collect()
}
