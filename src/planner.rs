//! Context engine: turns raw text plus a requester/target hint into a
//! `TranslationJob` (or a "nothing to do" / "ask for a target" outcome),
//! consulting policy, language resolution, detection, and both memories.
//! Planning never raises to the caller: lookups degrade to safe defaults
//! through the injected error sink.

use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::detect::{script_heuristic, Detector};
use crate::language::LanguageResolver;
use crate::memory::{ContextMemory, SessionMemory};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::normalize::Normalizer;
use crate::policy::{Policy, PolicyStore};
use crate::prefs::PreferenceStore;
use crate::sink::ErrorSink;
use crate::types::{JobMeta, Plan, PlanContext, TranslationJob, TranslationResponse};

/// Namespace prefix for per-scope last-outcome records in context memory.
fn outcome_namespace(scope: &str) -> String {
    format!("outcome:{scope}")
}

pub struct Planner {
    policies: Arc<PolicyStore>,
    sessions: Arc<SessionMemory>,
    contexts: Arc<ContextMemory>,
    resolver: Arc<LanguageResolver>,
    detector: Arc<dyn Detector>,
    prefs: Arc<dyn PreferenceStore>,
    sink: Arc<dyn ErrorSink>,
    metrics: Arc<MetricsRegistry>,
    normalizer: Normalizer,
    config: EngineConfig,
}

impl Planner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policies: Arc<PolicyStore>,
        sessions: Arc<SessionMemory>,
        contexts: Arc<ContextMemory>,
        resolver: Arc<LanguageResolver>,
        detector: Arc<dyn Detector>,
        prefs: Arc<dyn PreferenceStore>,
        sink: Arc<dyn ErrorSink>,
        metrics: Arc<MetricsRegistry>,
        config: EngineConfig,
    ) -> Self {
        let normalizer = Normalizer::new(config.max_text_len);
        Self {
            policies,
            sessions,
            contexts,
            resolver,
            detector,
            prefs,
            sink,
            metrics,
            normalizer,
            config,
        }
    }

    /// Plan a translation aimed at the requester's own target language.
    pub async fn plan_for_requester(
        &self,
        scope: &str,
        requester: &str,
        text: &str,
        forced_target: Option<&str>,
        channel: Option<&str>,
    ) -> Plan {
        self.plan_inner(scope, requester, requester, text, forced_target, channel)
            .await
    }

    /// Plan a translation aimed at another participant's target language,
    /// for "translate so the other user can read it" flows.
    pub async fn plan_for_pair(
        &self,
        scope: &str,
        requester: &str,
        other_user: &str,
        text: &str,
        forced_target: Option<&str>,
        channel: Option<&str>,
    ) -> Plan {
        self.plan_inner(scope, requester, other_user, text, forced_target, channel)
            .await
    }

    /// Plan with an explicit target token ("de", "French", a flag).
    pub async fn plan_for_explicit_code(
        &self,
        scope: &str,
        requester: &str,
        text: &str,
        code: &str,
        channel: Option<&str>,
    ) -> Plan {
        self.plan_inner(scope, requester, requester, text, Some(code), channel)
            .await
    }

    async fn plan_inner(
        &self,
        scope: &str,
        requester: &str,
        target_user: &str,
        text: &str,
        forced_target: Option<&str>,
        channel: Option<&str>,
    ) -> Plan {
        let plan_span = self.metrics.span(metric_names::PLAN_DONE);

        let policy = self.policies.get(scope, channel, Some(requester));
        let history = self
            .sessions
            .history(scope, channel, requester, Some(self.config.history_limit));
        let normalized = self.normalizer.preprocess(text);

        let (mut target, forced) = match forced_target {
            Some(token) => (self.resolver.resolve(token), true),
            None => (
                self.lookup_cached_target(scope, target_user).await,
                false,
            ),
        };

        // A resolved target still has to clear the policy's blocked set.
        if let (Some(tgt), Some(policy)) = (target.clone(), policy.as_ref()) {
            if !policy.allows(&tgt) {
                target = if policy.allows(&policy.fallback_lang) {
                    debug!(
                        scope = scope,
                        blocked = %tgt,
                        fallback = %policy.fallback_lang,
                        "target blocked by policy, substituting fallback"
                    );
                    Some(policy.fallback_lang.clone())
                } else {
                    None
                };
            }
        }

        let src = self
            .detect_source(&normalized, policy.as_ref(), scope, requester)
            .await;

        let Some(tgt) = target else {
            plan_span.finish();
            debug!(scope = scope, requester = requester, "no target known, caller must ask");
            return Plan {
                job: None,
                context: PlanContext::unknown_target(src),
            };
        };

        if src == tgt {
            plan_span.finish();
            debug!(scope = scope, requester = requester, lang = %src, "source equals target, nothing to do");
            return Plan {
                job: None,
                context: PlanContext::resolved(src, tgt),
            };
        }

        let meta = JobMeta {
            policy: policy
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
            preferred_providers: policy
                .as_ref()
                .map(|p| p.preferred_providers.clone())
                .unwrap_or_default(),
            recent_history: history.iter().map(|r| r.value.clone()).collect(),
            normalized_text: (normalized != text).then_some(normalized),
            forced_target: forced,
        };

        let job = TranslationJob {
            id: uuid::Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            requester: requester.to_string(),
            channel: channel.map(str::to_string),
            text: text.to_string(),
            src: src.clone(),
            tgt: tgt.clone(),
            meta,
        };
        plan_span.finish();
        debug!(job_id = %job.id, src = %src, tgt = %tgt, "job planned");

        Plan {
            job: Some(job),
            context: PlanContext::resolved(src, tgt),
        }
    }

    /// Standing preference first, then the last recorded outcome's target.
    async fn lookup_cached_target(&self, scope: &str, user: &str) -> Option<String> {
        if let Some(pref) = self.prefs.get_preference(scope, user).await {
            // Stored preferences may predate alias table changes; canonicalize.
            if let Some(code) = self.resolver.resolve(&pref) {
                return Some(code);
            }
            self.sink
                .log_error(&format!("unresolvable stored preference {pref:?}"), "planner.prefs");
        }
        self.contexts
            .get(&outcome_namespace(scope), user)
            .and_then(|v| v.get("tgt").and_then(|t| t.as_str()).map(str::to_string))
    }

    /// Detector when the policy permits, last-outcome source when it does
    /// not, pure Unicode-range heuristic as the ultimate fallback.
    async fn detect_source(
        &self,
        normalized: &str,
        policy: Option<&Policy>,
        scope: &str,
        user: &str,
    ) -> String {
        let auto_detect = policy.map(|p| p.auto_detect).unwrap_or(true);
        if !auto_detect {
            if let Some(src) = self
                .contexts
                .get(&outcome_namespace(scope), user)
                .and_then(|v| v.get("src").and_then(|s| s.as_str()).map(str::to_string))
            {
                return src;
            }
            return script_heuristic(normalized).to_string();
        }

        let detect_span = self.metrics.span(metric_names::DETECT_DONE);
        let detected = self.detector.detect(normalized).await;
        detect_span.finish();
        match detected {
            Ok(d) => d.lang,
            Err(e) => {
                self.sink.log_error(&e, "planner.detect");
                script_heuristic(normalized).to_string()
            }
        }
    }

    /// Fold a finished translation back into both memories: one session
    /// event for the utterance, one context record for the outcome.
    pub fn record_outcome(&self, job: &TranslationJob, response: &TranslationResponse) {
        self.sessions.add_event(
            &job.scope,
            job.channel.as_deref(),
            &job.requester,
            &job.text,
            Some(serde_json::json!({
                "src": response.src,
                "tgt": response.tgt,
                "provider": response.provider,
                "ok": !response.is_failure(),
            })),
        );
        self.contexts.set(
            &outcome_namespace(&job.scope),
            &job.requester,
            serde_json::json!({
                "src": response.src,
                "tgt": response.tgt,
                "provider": response.provider,
                "ok": !response.is_failure(),
            }),
            self.config.context_ttl,
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SyncDetector;
    use crate::prefs::MemoryPreferences;
    use crate::sink::test_support::RecordingSink;
    use crate::sink::TracingSink;

    struct Fixture {
        planner: Planner,
        policies: Arc<PolicyStore>,
        prefs: Arc<MemoryPreferences>,
    }

    /// Planner over an english-reporting detector and empty stores.
    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(SyncDetector::new(|_: &str| Some(("en".to_string(), 0.99)))),
            Arc::new(TracingSink),
        )
    }

    fn fixture_with(detector: Arc<dyn Detector>, sink: Arc<dyn ErrorSink>) -> Fixture {
        let policies = Arc::new(PolicyStore::new());
        let contexts = Arc::new(ContextMemory::new(64));
        let prefs = Arc::new(MemoryPreferences::new(Arc::clone(&contexts)));
        let planner = Planner::new(
            Arc::clone(&policies),
            Arc::new(SessionMemory::new(8, None)),
            contexts,
            Arc::new(LanguageResolver::new(0.77)),
            detector,
            Arc::clone(&prefs) as Arc<dyn PreferenceStore>,
            sink,
            Arc::new(MetricsRegistry::new()),
            EngineConfig::default(),
        );
        Fixture {
            planner,
            policies,
            prefs,
        }
    }

    #[tokio::test]
    async fn same_language_short_circuits() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", Some("en"), None)
            .await;
        assert!(plan.job.is_none());
        assert!(!plan.context.needs_target);
        assert_eq!(plan.context.tgt.as_deref(), Some("en"));
        assert_eq!(plan.context.src, "en");
    }

    #[tokio::test]
    async fn unknown_target_asks_the_caller() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", None, None)
            .await;
        assert!(plan.job.is_none());
        assert!(plan.context.needs_target);
        assert_eq!(plan.context.src, "en");
        assert!(plan.context.tgt.is_none());
    }

    #[tokio::test]
    async fn forced_target_resolves_aliases() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", Some("German"), None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.src, "en");
        assert_eq!(job.tgt, "de");
        assert!(job.meta.forced_target);
    }

    #[tokio::test]
    async fn explicit_code_plans_like_a_forced_target() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_explicit_code("g", "u", "hello there", "🇫🇷", None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.tgt, "fr");
        assert!(job.meta.forced_target);
    }

    #[tokio::test]
    async fn unresolvable_forced_target_is_not_invented() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello", Some("not a language at all"), None)
            .await;
        assert!(plan.job.is_none());
        assert!(plan.context.needs_target);
    }

    #[tokio::test]
    async fn blocked_target_substitutes_policy_fallback() {
        let f = fixture();
        let mut policy = Policy {
            fallback_lang: "fr".to_string(),
            ..Policy::default()
        };
        policy.blocked_langs.insert("de".to_string());
        f.policies.set_scope("g", policy).unwrap();

        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", Some("de"), None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.tgt, "fr");
    }

    #[tokio::test]
    async fn stored_preference_supplies_the_target() {
        let f = fixture();
        f.prefs.set_preference("g", "u", "pt-BR").await;
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", None, None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.tgt, "pt");
        assert!(!job.meta.forced_target);
    }

    #[tokio::test]
    async fn pair_planning_uses_the_other_users_preference() {
        let f = fixture();
        f.prefs.set_preference("g", "them", "ja").await;
        let plan = f
            .planner
            .plan_for_pair("g", "me", "them", "hello there", None, None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.tgt, "ja");
        assert_eq!(job.requester, "me");

        // The requester's own planning still has no target.
        let own = f
            .planner
            .plan_for_requester("g", "me", "hello there", None, None)
            .await;
        assert!(own.context.needs_target);
    }

    #[tokio::test]
    async fn recorded_outcome_feeds_the_next_plan() {
        let f = fixture();
        let plan = f
            .planner
            .plan_for_requester("g", "u", "hello there", Some("de"), None)
            .await;
        let job = plan.job.unwrap();
        let response = TranslationResponse {
            text: Some("hallo".to_string()),
            src: "en".to_string(),
            tgt: "de".to_string(),
            provider: Some("static".to_string()),
            confidence: 0.9,
            meta: serde_json::json!({}),
        };
        f.planner.record_outcome(&job, &response);

        // Next plan with no hint reuses the last outcome's target.
        let next = f
            .planner
            .plan_for_requester("g", "u", "more text here", None, None)
            .await;
        let job = next.job.expect("job");
        assert_eq!(job.tgt, "de");
        // And the session history excerpt carries the previous utterance.
        assert_eq!(job.meta.recent_history, vec!["hello there".to_string()]);
    }

    #[tokio::test]
    async fn detector_failure_degrades_to_script_heuristic() {
        let sink = Arc::new(RecordingSink::new());
        let f = fixture_with(
            Arc::new(SyncDetector::new(|_: &str| None)),
            Arc::clone(&sink) as Arc<dyn ErrorSink>,
        );
        let plan = f
            .planner
            .plan_for_requester("g", "u", "привет как дела", Some("en"), None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.src, "ru");
        let entries = sink.entries.lock();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "planner.detect");
    }

    #[tokio::test]
    async fn job_meta_snapshots_policy_and_normalization() {
        let f = fixture();
        let policy = Policy {
            preferred_providers: vec!["deepl".to_string()],
            ..Policy::default()
        };
        f.policies.set_scope("g", policy).unwrap();

        let messy = "hello\u{201D}   there";
        let plan = f
            .planner
            .plan_for_requester("g", "u", messy, Some("de"), None)
            .await;
        let job = plan.job.expect("job");
        assert_eq!(job.text, messy);
        assert_eq!(job.meta.normalized_text.as_deref(), Some("hello\" there"));
        assert_eq!(job.meta.preferred_providers, vec!["deepl".to_string()]);
        assert!(job.meta.policy.is_some());
        assert_eq!(job.provider_text(), "hello\" there");
    }
}
