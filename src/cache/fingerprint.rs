//! Deterministic cache keys for synthesis requests.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::SpeechRequest;

/// Bumped whenever the canonical form changes, so old entries stop matching.
const FINGERPRINT_VERSION: u32 = 1;

/// Lowercase hex SHA-256 of a request's output-relevant fields.
///
/// Computed over a canonical JSON form of the normalized request: text
/// (trimmed, case preserved), language tag, gender (default filled),
/// explicit voice and preferred provider. Identical normalized requests
/// always share a fingerprint; requests that differ in any of those fields,
/// including gender alone, do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheFingerprint(String);

#[derive(Serialize)]
struct Canonical<'a> {
    v: u32,
    text: &'a str,
    language: &'a str,
    gender: &'a str,
    voice: Option<&'a str>,
    provider: Option<&'a str>,
}

impl CacheFingerprint {
    pub fn of(request: &SpeechRequest) -> Self {
        let canonical = Canonical {
            v: FINGERPRINT_VERSION,
            text: request.text(),
            language: request.language().as_str(),
            gender: request.gender().as_str(),
            voice: request.voice(),
            provider: request.preferred_provider(),
        };
        // Serializing a plain struct of strings cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        Self(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard used for on-disk fan-out.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
