//! tolk: context-aware translation planning + multi-provider orchestration.
//! The planner resolves who the target language is for and whether work is
//! needed at all; the orchestrator runs the policy-ordered provider fallback
//! chain. Everything is wired here, in one composition root, and passed
//! downward — no globals, no back-references.

pub mod cache;
pub mod config;
pub mod detect;
pub mod language;
pub mod memory;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod planner;
pub mod policy;
pub mod prefs;
pub mod providers;
pub mod sink;
pub mod types;

use std::sync::Arc;

use tracing::info;

use cache::ResultCache;
use config::EngineConfig;
use detect::{Detector, WhatlangDetector};
use language::LanguageResolver;
use memory::{ContextMemory, SessionMemory};
use metrics::MetricsRegistry;
use normalize::Normalizer;
use orchestrator::Orchestrator;
use planner::Planner;
use policy::PolicyStore;
use prefs::{MemoryPreferences, PreferenceStore};
use providers::Provider;
use sink::{ErrorSink, TracingSink};
use types::{Plan, PlanContext, TranslationResponse};

/// Initialize structured logging. Call once from the embedding process.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tolk=debug".parse().unwrap()),
        )
        .with_target(true)
        .init();
}

/// Combined plan + orchestration outcome of a convenience call.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub context: PlanContext,
    /// None when planning produced no job (nothing to do / needs target).
    pub response: Option<TranslationResponse>,
}

/// The assembled pipeline. Build one per process via `EngineBuilder` and
/// share it; all components are safe for concurrent use.
pub struct Engine {
    planner: Planner,
    orchestrator: Orchestrator,
    normalizer: Normalizer,
    policies: Arc<PolicyStore>,
    sessions: Arc<SessionMemory>,
    contexts: Arc<ContextMemory>,
    resolver: Arc<LanguageResolver>,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn sessions(&self) -> &Arc<SessionMemory> {
        &self.sessions
    }

    pub fn contexts(&self) -> &Arc<ContextMemory> {
        &self.contexts
    }

    pub fn resolver(&self) -> &Arc<LanguageResolver> {
        &self.resolver
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// The output normalizer, exposed for callers translating long text
    /// piecewise via `split_into_chunks`.
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Plan, execute, and record in one call, targeting the requester's
    /// own language.
    pub async fn translate_for_requester(
        &self,
        scope: &str,
        requester: &str,
        text: &str,
        forced_target: Option<&str>,
        channel: Option<&str>,
    ) -> Outcome {
        let plan = self
            .planner
            .plan_for_requester(scope, requester, text, forced_target, channel)
            .await;
        self.run(plan).await
    }

    /// Plan, execute, and record in one call, targeting another
    /// participant's language.
    pub async fn translate_for_pair(
        &self,
        scope: &str,
        requester: &str,
        other_user: &str,
        text: &str,
        forced_target: Option<&str>,
        channel: Option<&str>,
    ) -> Outcome {
        let plan = self
            .planner
            .plan_for_pair(scope, requester, other_user, text, forced_target, channel)
            .await;
        self.run(plan).await
    }

    async fn run(&self, plan: Plan) -> Outcome {
        let Plan { job, context } = plan;
        let Some(job) = job else {
            return Outcome {
                context,
                response: None,
            };
        };
        let mut response = self.orchestrator.execute(&job, None).await;
        self.planner.record_outcome(&job, &response);
        if let Some(text) = response.text.take() {
            response.text = Some(self.normalizer.postprocess(&text));
        }
        Outcome {
            context,
            response: Some(response),
        }
    }
}

/// Explicit construction: dependencies are injected here and flow downward.
pub struct EngineBuilder {
    config: EngineConfig,
    providers: Vec<Arc<dyn Provider>>,
    detector: Option<Arc<dyn Detector>>,
    prefs: Option<Arc<dyn PreferenceStore>>,
    sink: Option<Arc<dyn ErrorSink>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            providers: Vec::new(),
            detector: None,
            prefs: None,
            sink: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider adapter. Registration order does not matter;
    /// the orchestrator orders by policy preference, then static priority.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn preference_store(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let metrics = Arc::new(MetricsRegistry::new());
        let policies = Arc::new(PolicyStore::new());
        let sessions = Arc::new(SessionMemory::new(
            config.session_capacity,
            Some(config.session_ttl),
        ));
        let contexts = Arc::new(ContextMemory::new(config.context_capacity));
        let resolver = Arc::new(LanguageResolver::new(config.fuzzy_threshold));
        let detector = self
            .detector
            .unwrap_or_else(|| Arc::new(WhatlangDetector));
        let prefs = self
            .prefs
            .unwrap_or_else(|| Arc::new(MemoryPreferences::new(Arc::clone(&contexts))));
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let cache = Arc::new(ResultCache::new(
            config.result_cache_capacity,
            config.result_cache_ttl,
        ));
        let orchestrator = Orchestrator::new(
            self.providers,
            cache,
            Arc::clone(&metrics),
            config.provider_timeout,
        );
        let normalizer = Normalizer::new(config.max_text_len);
        let planner = Planner::new(
            Arc::clone(&policies),
            Arc::clone(&sessions),
            Arc::clone(&contexts),
            Arc::clone(&resolver),
            detector,
            prefs,
            sink,
            Arc::clone(&metrics),
            config,
        );

        info!("engine assembled");
        Engine {
            planner,
            orchestrator,
            normalizer,
            policies,
            sessions,
            contexts,
            resolver,
            metrics,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
