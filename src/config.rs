//! Engine configuration: timeouts, capacities, TTLs.
//! Every knob has a documented default; embedders override what they need.

use std::time::Duration;

/// Tunables for the planning/orchestration pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-provider call timeout inside one `execute`.
    pub provider_timeout: Duration,
    /// How many recent session entries the planner attaches as context.
    pub history_limit: usize,
    /// Per-(scope, channel, user) session ring capacity.
    pub session_capacity: usize,
    /// TTL for session entries.
    pub session_ttl: Duration,
    /// Per-namespace record cap in context memory.
    pub context_capacity: usize,
    /// Default TTL for context memory records (None = no expiry).
    pub context_ttl: Option<Duration>,
    /// Result cache capacity (entries).
    pub result_cache_capacity: usize,
    /// Result cache TTL.
    pub result_cache_ttl: Duration,
    /// Maximum input length accepted by the normalizer, in chars.
    pub max_text_len: usize,
    /// Similarity threshold for fuzzy language-token matching (0.0-1.0).
    pub fuzzy_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(8),
            history_limit: 6,
            session_capacity: 32,
            session_ttl: Duration::from_secs(30 * 60),
            context_capacity: 256,
            context_ttl: Some(Duration::from_secs(6 * 3600)),
            result_cache_capacity: 512,
            result_cache_ttl: Duration::from_secs(600),
            max_text_len: 3000,
            fuzzy_threshold: 0.77,
        }
    }
}
