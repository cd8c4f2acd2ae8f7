//! Core request/response shapes shared across the pipeline.
//! A job is an immutable planning artifact consumed exactly once by the
//! orchestrator; results (not jobs) are what get cached afterwards.

use serde::{Deserialize, Serialize};

/// A fully-resolved request to translate specific text.
/// Built by the planner, never mutated, consumed once by `execute`.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationJob {
    pub id: String,
    pub scope: String,
    pub requester: String,
    pub channel: Option<String>,
    /// Original text as submitted (pre-normalization).
    pub text: String,
    pub src: String,
    pub tgt: String,
    pub meta: JobMeta,
}

/// Planning metadata carried alongside a job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobMeta {
    /// Snapshot of the effective policy at planning time, if any.
    pub policy: Option<serde_json::Value>,
    /// Provider ids the policy prefers, in order. Empty means default order.
    pub preferred_providers: Vec<String>,
    /// Most-recent-first excerpt of the requester's session history.
    pub recent_history: Vec<String>,
    /// Normalized text variant, present only when it differs from `text`.
    pub normalized_text: Option<String>,
    /// True when the caller forced the target language explicitly.
    pub forced_target: bool,
}

impl TranslationJob {
    /// The text providers should receive: normalized variant when one exists.
    pub fn provider_text(&self) -> &str {
        self.meta.normalized_text.as_deref().unwrap_or(&self.text)
    }
}

/// Normalized orchestration result. `text == None` means the job failed
/// regardless of the other fields; the caller decides what to show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub text: Option<String>,
    pub src: String,
    pub tgt: String,
    pub provider: Option<String>,
    pub confidence: f32,
    pub meta: serde_json::Value,
}

impl TranslationResponse {
    pub fn is_failure(&self) -> bool {
        self.text.is_none()
    }
}

/// Outcome of a planning call.
#[derive(Debug, Clone)]
pub struct Plan {
    /// None when no translation is needed or no target is known.
    pub job: Option<TranslationJob>,
    pub context: PlanContext,
}

/// What the planner learned, surfaced even when no job is produced so the
/// calling layer can distinguish "nothing to do" from "ask for a target".
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub src: String,
    pub tgt: Option<String>,
    pub needs_target: bool,
}

impl PlanContext {
    pub fn resolved(src: String, tgt: String) -> Self {
        Self {
            src,
            tgt: Some(tgt),
            needs_target: false,
        }
    }

    pub fn unknown_target(src: String) -> Self {
        Self {
            src,
            tgt: None,
            needs_target: true,
        }
    }
}
