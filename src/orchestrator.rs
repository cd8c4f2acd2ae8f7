//! Executes a job against the ordered, policy-filtered provider list with
//! per-candidate timeout and structured fallback. Providers are tried
//! strictly in order; the first non-empty text wins. A timeout cancels only
//! that candidate's in-flight call and orchestration moves on.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CachedResult, ResultCache};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::providers::{supports_target, Provider, ProviderError};
use crate::types::{TranslationJob, TranslationResponse};

/// States of a single job execution. Terminal: Success, Exhausted.
/// No retry of the same provider within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Pending,
    Trying(usize),
    Success,
    Exhausted,
}

impl std::fmt::Display for ExecState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecState::Pending => write!(f, "Pending"),
            ExecState::Trying(i) => write!(f, "Trying({i})"),
            ExecState::Success => write!(f, "Success"),
            ExecState::Exhausted => write!(f, "Exhausted"),
        }
    }
}

impl ExecState {
    pub fn can_transition_to(self, next: ExecState) -> bool {
        matches!(
            (self, next),
            (ExecState::Pending, ExecState::Trying(0))
                | (ExecState::Pending, ExecState::Exhausted)
                | (ExecState::Trying(_), ExecState::Success)
                | (ExecState::Trying(_), ExecState::Exhausted)
        ) || matches!((self, next), (ExecState::Trying(i), ExecState::Trying(j)) if j == i + 1)
    }
}

/// Per-execution state tracker with validated, logged transitions.
struct ExecTracker<'a> {
    state: ExecState,
    job_id: &'a str,
}

impl<'a> ExecTracker<'a> {
    fn new(job_id: &'a str) -> Self {
        Self {
            state: ExecState::Pending,
            job_id,
        }
    }

    fn advance(&mut self, next: ExecState) {
        if !self.state.can_transition_to(next) {
            warn!(
                job_id = self.job_id,
                from = %self.state,
                to = %next,
                "invalid execution state transition"
            );
            return;
        }
        debug!(job_id = self.job_id, from = %self.state, to = %next, "exec_state");
        self.state = next;
    }
}

pub struct Orchestrator {
    /// All registered adapters, pre-sorted by descending static priority.
    providers: Vec<Arc<dyn Provider>>,
    cache: Arc<ResultCache>,
    metrics: Arc<MetricsRegistry>,
    default_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        mut providers: Vec<Arc<dyn Provider>>,
        cache: Arc<ResultCache>,
        metrics: Arc<MetricsRegistry>,
        default_timeout: Duration,
    ) -> Self {
        providers.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self {
            providers,
            cache,
            metrics,
            default_timeout,
        }
    }

    /// Run the fallback chain for one job. Never panics and never returns
    /// the original text dressed up as a translation; exhaustion yields
    /// `text: None` and the caller decides what to show.
    pub async fn execute(
        &self,
        job: &TranslationJob,
        timeout_override: Option<Duration>,
    ) -> TranslationResponse {
        let span = self.metrics.span(metric_names::EXECUTE_DONE);
        let started = Instant::now();
        let mut tracker = ExecTracker::new(&job.id);

        let text = job.provider_text();
        let key = ResultCache::compute_key(&job.src, &job.tgt, text);
        if let Some(hit) = self.cache.get(&key) {
            self.metrics.incr(metric_names::CACHE_HIT);
            span.finish();
            debug!(job_id = %job.id, provider = %hit.provider, "result cache hit");
            return TranslationResponse {
                text: Some(hit.text),
                src: job.src.clone(),
                tgt: job.tgt.clone(),
                provider: Some(hit.provider),
                confidence: hit.confidence,
                meta: serde_json::json!({
                    "cached": true,
                    "elapsed_ms": elapsed_ms(started),
                }),
            };
        }
        self.metrics.incr(metric_names::CACHE_MISS);

        let candidates = self.candidates(job);
        if candidates.is_empty() {
            tracker.advance(ExecState::Exhausted);
            span.finish();
            return self.failure_response(job, started, Vec::new(), "no candidate providers");
        }

        let mut failures: Vec<serde_json::Value> = Vec::new();
        let mut last_reason = String::new();

        for (i, provider) in candidates.iter().enumerate() {
            tracker.advance(ExecState::Trying(i));
            let timeout = timeout_override
                .or_else(|| provider.timeout_hint())
                .unwrap_or(self.default_timeout);

            let call_span = self.metrics.span(metric_names::PROVIDER_CALL);
            let cancel = CancellationToken::new();
            let result = tokio::select! {
                r = provider.translate(text, &job.src, &job.tgt, &cancel) => r,
                _ = tokio::time::sleep(timeout) => {
                    // Cancel the in-flight call, don't just stop awaiting it.
                    cancel.cancel();
                    Err(ProviderError::Timeout)
                }
            };
            call_span.finish();

            match result {
                Ok(reply) if !reply.text().trim().is_empty() => {
                    tracker.advance(ExecState::Success);
                    let confidence = reply.confidence_or(provider.default_confidence());
                    let detected_src = reply.detected_src().map(str::to_string);
                    let translated = reply.into_text();
                    self.cache.insert(
                        key,
                        CachedResult {
                            text: translated.clone(),
                            provider: provider.id().to_string(),
                            confidence,
                        },
                    );
                    let elapsed = elapsed_ms(started);
                    span.finish();
                    info!(
                        job_id = %job.id,
                        provider = provider.id(),
                        attempts = i + 1,
                        elapsed_ms = elapsed,
                        "translation succeeded"
                    );
                    return TranslationResponse {
                        text: Some(translated),
                        src: job.src.clone(),
                        tgt: job.tgt.clone(),
                        provider: Some(provider.id().to_string()),
                        confidence,
                        meta: serde_json::json!({
                            "cached": false,
                            "elapsed_ms": elapsed,
                            "failures": failures,
                            "detected_src": detected_src,
                        }),
                    };
                }
                Ok(_) => {
                    last_reason = format!("{}: empty reply", provider.id());
                    warn!(job_id = %job.id, provider = provider.id(), "empty reply, falling back");
                    failures.push(serde_json::json!({
                        "provider": provider.id(),
                        "reason": "empty reply",
                    }));
                }
                Err(e) => {
                    match e {
                        ProviderError::Timeout => {
                            self.metrics.incr(metric_names::PROVIDER_TIMEOUT)
                        }
                        _ => self.metrics.incr(metric_names::PROVIDER_ERROR),
                    }
                    last_reason = format!("{}: {e}", provider.id());
                    warn!(job_id = %job.id, provider = provider.id(), error = %e, "provider failed, falling back");
                    failures.push(serde_json::json!({
                        "provider": provider.id(),
                        "reason": e.to_string(),
                    }));
                }
            }
        }

        tracker.advance(ExecState::Exhausted);
        span.finish();
        let reason = if last_reason.is_empty() {
            "all providers exhausted".to_string()
        } else {
            last_reason
        };
        self.failure_response(job, started, failures, &reason)
    }

    /// Candidate list: policy-preferred ids first (restricted to providers
    /// that support the target), else every supporting provider in static
    /// priority order.
    fn candidates(&self, job: &TranslationJob) -> Vec<Arc<dyn Provider>> {
        let preferred = &job.meta.preferred_providers;
        if !preferred.is_empty() {
            let picked: Vec<Arc<dyn Provider>> = preferred
                .iter()
                .filter_map(|id| self.providers.iter().find(|p| p.id() == id))
                .filter(|p| supports_target(p.as_ref(), &job.tgt))
                .cloned()
                .collect();
            if !picked.is_empty() {
                return picked;
            }
            debug!(job_id = %job.id, "no preferred provider supports target, using default order");
        }
        self.providers
            .iter()
            .filter(|p| supports_target(p.as_ref(), &job.tgt))
            .cloned()
            .collect()
    }

    fn failure_response(
        &self,
        job: &TranslationJob,
        started: Instant,
        failures: Vec<serde_json::Value>,
        reason: &str,
    ) -> TranslationResponse {
        info!(job_id = %job.id, reason = reason, "translation exhausted");
        TranslationResponse {
            text: None,
            src: job.src.clone(),
            tgt: job.tgt.clone(),
            provider: None,
            confidence: 0.0,
            meta: serde_json::json!({
                "cached": false,
                "error": reason,
                "failures": failures,
                "elapsed_ms": elapsed_ms(started),
            }),
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{StaticBehavior, StaticProvider};
    use crate::types::JobMeta;

    fn job(src: &str, tgt: &str, text: &str) -> TranslationJob {
        TranslationJob {
            id: "job-1".to_string(),
            scope: "g".to_string(),
            requester: "u".to_string(),
            channel: None,
            text: text.to_string(),
            src: src.to_string(),
            tgt: tgt.to_string(),
            meta: JobMeta::default(),
        }
    }

    fn orchestrator(providers: Vec<Arc<dyn Provider>>) -> Orchestrator {
        Orchestrator::new(
            providers,
            Arc::new(ResultCache::new(16, Duration::from_secs(60))),
            Arc::new(MetricsRegistry::new()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn exec_states_validate_transitions() {
        assert!(ExecState::Pending.can_transition_to(ExecState::Trying(0)));
        assert!(ExecState::Trying(0).can_transition_to(ExecState::Trying(1)));
        assert!(ExecState::Trying(1).can_transition_to(ExecState::Success));
        assert!(ExecState::Trying(1).can_transition_to(ExecState::Exhausted));
        assert!(!ExecState::Trying(0).can_transition_to(ExecState::Trying(0)));
        assert!(!ExecState::Trying(0).can_transition_to(ExecState::Trying(2)));
        assert!(!ExecState::Success.can_transition_to(ExecState::Trying(0)));
    }

    #[tokio::test]
    async fn unsupported_provider_is_never_invoked() {
        let a = Arc::new(
            StaticProvider::new("a", StaticBehavior::Reply("nope".into()))
                .with_priority(90)
                .with_languages(&["fr"]),
        );
        let b = Arc::new(
            StaticProvider::new("b", StaticBehavior::Reply("x".into())).with_priority(10),
        );
        let orch = orchestrator(vec![a.clone(), b.clone()]);

        let resp = orch.execute(&job("en", "de", "hello"), None).await;
        assert_eq!(resp.provider.as_deref(), Some("b"));
        assert_eq!(resp.text.as_deref(), Some("x"));
        assert_eq!(a.calls(), 0);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_through_and_is_recorded() {
        let a = Arc::new(
            StaticProvider::new(
                "a",
                StaticBehavior::Delay(Duration::from_secs(60), "slow".into()),
            )
            .with_priority(90),
        );
        let b = Arc::new(
            StaticProvider::new("b", StaticBehavior::Reply("y".into())).with_priority(10),
        );
        let orch = orchestrator(vec![a, b]);

        let resp = orch
            .execute(&job("en", "de", "hello"), Some(Duration::from_millis(50)))
            .await;
        assert_eq!(resp.provider.as_deref(), Some("b"));
        assert_eq!(resp.text.as_deref(), Some("y"));
        let failures = resp.meta["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["provider"], "a");
        assert!(failures[0]["reason"]
            .as_str()
            .unwrap()
            .contains("timeout"));
    }

    #[tokio::test]
    async fn all_failures_exhaust_with_null_text() {
        let a = Arc::new(StaticProvider::new("a", StaticBehavior::Fail("down".into())));
        let b = Arc::new(StaticProvider::new("b", StaticBehavior::Fail("also down".into())));
        let orch = orchestrator(vec![a, b]);

        let resp = orch.execute(&job("en", "de", "hello"), None).await;
        assert!(resp.text.is_none());
        assert!(resp.provider.is_none());
        assert!(resp.meta["error"].as_str().unwrap().contains("also down"));
        assert_eq!(resp.meta["failures"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_reply_is_a_soft_failure() {
        let a = Arc::new(StaticProvider::new("a", StaticBehavior::Empty).with_priority(90));
        let b = Arc::new(
            StaticProvider::new("b", StaticBehavior::Reply("ok".into())).with_priority(10),
        );
        let orch = orchestrator(vec![a.clone(), b]);

        let resp = orch.execute(&job("en", "de", "hello"), None).await;
        assert_eq!(resp.provider.as_deref(), Some("b"));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn repeat_jobs_hit_the_result_cache() {
        let a = Arc::new(StaticProvider::new("a", StaticBehavior::Reply("hallo".into())));
        let orch = orchestrator(vec![a.clone()]);

        let first = orch.execute(&job("en", "de", "hello"), None).await;
        assert_eq!(first.meta["cached"], false);
        let second = orch.execute(&job("en", "de", "hello"), None).await;
        assert_eq!(second.meta["cached"], true);
        assert_eq!(second.text.as_deref(), Some("hallo"));
        assert_eq!(second.provider.as_deref(), Some("a"));
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn policy_preference_overrides_static_order() {
        let a = Arc::new(
            StaticProvider::new("a", StaticBehavior::Reply("from-a".into())).with_priority(90),
        );
        let b = Arc::new(
            StaticProvider::new("b", StaticBehavior::Reply("from-b".into())).with_priority(10),
        );
        let orch = orchestrator(vec![a, b]);

        let mut j = job("en", "de", "hello");
        j.meta.preferred_providers = vec!["b".to_string(), "a".to_string()];
        let resp = orch.execute(&j, None).await;
        assert_eq!(resp.provider.as_deref(), Some("b"));
        assert_eq!(resp.text.as_deref(), Some("from-b"));
    }

    #[tokio::test]
    async fn no_supporting_provider_exhausts_immediately() {
        let a = Arc::new(
            StaticProvider::new("a", StaticBehavior::Reply("x".into())).with_languages(&["fr"]),
        );
        let orch = orchestrator(vec![a.clone()]);

        let resp = orch.execute(&job("en", "ja", "hello"), None).await;
        assert!(resp.text.is_none());
        assert_eq!(resp.meta["error"], "no candidate providers");
        assert_eq!(a.calls(), 0);
    }
}
