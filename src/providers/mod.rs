//! Provider adapter contract. Each external translation service is wrapped
//! once; heterogeneous response shapes are normalized into `ProviderReply`
//! at the adapter boundary so the orchestrator only ever sees one shape.

pub mod chat_llm;
pub mod deepl;
pub mod libre;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Normalized adapter result: plain text, or a shaped payload carrying
/// whatever extras the upstream service reported.
#[derive(Debug, Clone)]
pub enum ProviderReply {
    Text(String),
    Shaped {
        text: String,
        detected_src: Option<String>,
        confidence: Option<f32>,
    },
}

impl ProviderReply {
    pub fn text(&self) -> &str {
        match self {
            ProviderReply::Text(t) => t,
            ProviderReply::Shaped { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ProviderReply::Text(t) => t,
            ProviderReply::Shaped { text, .. } => text,
        }
    }

    /// Reported confidence, or the adapter's default when absent.
    pub fn confidence_or(&self, default: f32) -> f32 {
        match self {
            ProviderReply::Shaped {
                confidence: Some(c),
                ..
            } => *c,
            _ => default,
        }
    }

    pub fn detected_src(&self) -> Option<&str> {
        match self {
            ProviderReply::Shaped { detected_src, .. } => detected_src.as_deref(),
            ProviderReply::Text(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum ProviderError {
    Api(String),
    RateLimited { retry_after_ms: u64 },
    Timeout,
    Cancelled,
    InvalidInput(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Api(msg) => write!(f, "API error: {msg}"),
            ProviderError::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            ProviderError::Timeout => write!(f, "provider timeout"),
            ProviderError::Cancelled => write!(f, "provider call cancelled"),
            ProviderError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

/// Long-lived adapter around one external translation service. Any pooling
/// or rate limiting stays internal; callers see a plain async call.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    /// Static quality ranking used when no policy preference applies
    /// (higher tried first).
    fn priority(&self) -> u8 {
        50
    }

    /// Lowercase target codes this provider can produce.
    /// None means assume it supports everything.
    fn supported_languages(&self) -> Option<Vec<String>> {
        None
    }

    /// Confidence attributed to replies that carry none of their own.
    fn default_confidence(&self) -> f32 {
        0.9
    }

    /// Adapter-specific call timeout; None takes the engine default.
    fn timeout_hint(&self) -> Option<Duration> {
        None
    }

    /// Translate `text` from `src` to `tgt`. Implementations must observe
    /// `cancel` at their own suspension points so an expired call actually
    /// stops instead of running to completion in the background.
    async fn translate(
        &self,
        text: &str,
        src: &str,
        tgt: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError>;
}

/// Whether a provider claims support for the target language.
pub fn supports_target(provider: &dyn Provider, tgt: &str) -> bool {
    match provider.supported_languages() {
        Some(langs) => langs.iter().any(|l| l == tgt),
        None => true,
    }
}

/// Scripted in-process provider for tests and wiring checks.
pub struct StaticProvider {
    id: String,
    priority: u8,
    languages: Option<Vec<String>>,
    behavior: StaticBehavior,
    calls: AtomicUsize,
}

pub enum StaticBehavior {
    Reply(String),
    Empty,
    Fail(String),
    Delay(Duration, String),
}

impl StaticProvider {
    pub fn new(id: &str, behavior: StaticBehavior) -> Self {
        Self {
            id: id.to_string(),
            priority: 50,
            languages: None,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = Some(languages.iter().map(|l| l.to_string()).collect());
        self
    }

    /// How many times `translate` ran (not `supported_languages`).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        self.languages.clone()
    }

    async fn translate(
        &self,
        _text: &str,
        _src: &str,
        _tgt: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StaticBehavior::Reply(text) => Ok(ProviderReply::Text(text.clone())),
            StaticBehavior::Empty => Ok(ProviderReply::Text(String::new())),
            StaticBehavior::Fail(msg) => Err(ProviderError::Api(msg.clone())),
            StaticBehavior::Delay(wait, text) => {
                tokio::select! {
                    _ = tokio::time::sleep(*wait) => Ok(ProviderReply::Text(text.clone())),
                    _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_shapes_normalize_to_text() {
        assert_eq!(ProviderReply::Text("a".into()).text(), "a");
        let shaped = ProviderReply::Shaped {
            text: "b".into(),
            detected_src: Some("de".into()),
            confidence: Some(0.5),
        };
        assert_eq!(shaped.text(), "b");
        assert_eq!(shaped.detected_src(), Some("de"));
        assert_eq!(shaped.confidence_or(0.9), 0.5);
        assert_eq!(ProviderReply::Text("a".into()).confidence_or(0.9), 0.9);
    }

    #[test]
    fn support_defaults_to_everything() {
        let open = StaticProvider::new("open", StaticBehavior::Empty);
        assert!(supports_target(&open, "xx"));
        let narrow = StaticProvider::new("narrow", StaticBehavior::Empty)
            .with_languages(&["de", "fr"]);
        assert!(supports_target(&narrow, "de"));
        assert!(!supports_target(&narrow, "ja"));
    }
}
