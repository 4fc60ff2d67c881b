//! Telemetry metric name constants.
//!
//! Centralised metric names for parlante operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `parlante_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider` — adapter name (e.g. "elevenlabs", "gemini-2.0-flash"), or
//!   "cache" / "none"
//! - `operation` — "synthesize" or "reply"
//! - `status` — outcome: "ok" or "error"

/// Total orchestrated requests.
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "parlante_requests_total";

/// End-to-end orchestrated request duration in seconds.
///
/// Labels: `provider`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "parlante_request_duration_seconds";

/// Failed adapter attempts that fell through to the next candidate.
///
/// Labels: `provider`, `operation`, `kind`.
pub const FALLBACKS_TOTAL: &str = "parlante_fallbacks_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "parlante_retries_total";

/// Artifact cache hits.
pub const CACHE_HITS_TOTAL: &str = "parlante_cache_hits_total";

/// Artifact cache misses (including storage read failures).
pub const CACHE_MISSES_TOTAL: &str = "parlante_cache_misses_total";

/// Artifact cache storage errors.
///
/// Labels: `op` ("get" | "put").
pub const CACHE_ERRORS_TOTAL: &str = "parlante_cache_errors_total";

/// Times the reply circuit breaker opened.
pub const CIRCUIT_TRIPS_TOTAL: &str = "parlante_circuit_trips_total";

/// Calls rejected because the circuit was open.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "parlante_circuit_rejections_total";

/// Replies answered by the grammar pre-filter.
///
/// Labels: `rule`.
pub const GRAMMAR_HITS_TOTAL: &str = "parlante_grammar_hits_total";
