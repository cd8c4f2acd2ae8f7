//! LibreTranslate adapter (self-hosted or public instance). JSON POST; the
//! instance's language coverage is configuration, not a baked-in list.

use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{Provider, ProviderError, ProviderReply};

pub struct LibreProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Coverage of the configured instance; None assumes everything.
    languages: Option<Vec<String>>,
}

impl LibreProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        languages: Option<Vec<String>>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            languages,
        })
    }
}

#[async_trait::async_trait]
impl Provider for LibreProvider {
    fn id(&self) -> &str {
        "libretranslate"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        self.languages.clone()
    }

    async fn translate(
        &self,
        text: &str,
        src: &str,
        tgt: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        let mut body = serde_json::json!({
            "q": text,
            "source": src,
            "target": tgt,
            "format": "text",
        });
        if let Some(ref key) = self.api_key {
            body["api_key"] = serde_json::json!(key);
        }

        let request = self
            .http
            .post(format!("{}/translate", self.base_url))
            .json(&body)
            .send();

        let response = tokio::select! {
            r = request => r.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Api(e.to_string())
                }
            })?,
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        if response.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited { retry_after_ms: 0 });
        }
        if !response.status().is_success() {
            return Err(ProviderError::Api(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let body: TranslateBody = tokio::select! {
            r = response.json() => r.map_err(|e| ProviderError::Api(e.to_string()))?,
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        let confidence = body.detected_language_confidence();
        Ok(ProviderReply::Shaped {
            text: body.translated_text,
            detected_src: body
                .detected_language
                .map(|d| d.language.to_lowercase()),
            confidence,
        })
    }
}

#[derive(Deserialize)]
struct TranslateBody {
    #[serde(rename = "translatedText")]
    translated_text: String,
    #[serde(rename = "detectedLanguage")]
    detected_language: Option<DetectedLanguage>,
}

impl TranslateBody {
    fn detected_language_confidence(&self) -> Option<f32> {
        self.detected_language
            .as_ref()
            .map(|d| (d.confidence / 100.0) as f32)
    }
}

#[derive(Deserialize)]
struct DetectedLanguage {
    language: String,
    /// LibreTranslate reports confidence as a percentage.
    #[serde(default)]
    confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::supports_target;

    #[test]
    fn coverage_comes_from_configuration() {
        let open = LibreProvider::new("http://localhost:5000".into(), None, None).unwrap();
        assert!(supports_target(&open, "anything"));

        let narrow = LibreProvider::new(
            "http://localhost:5000".into(),
            None,
            Some(vec!["en".into(), "es".into()]),
        )
        .unwrap();
        assert!(supports_target(&narrow, "es"));
        assert!(!supports_target(&narrow, "ja"));
    }
}
