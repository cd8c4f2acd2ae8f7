//! DeepL v2 API adapter. Form-encoded POST, pooled connections, no retry:
//! the orchestrator's fallback chain is the recovery mechanism.

use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{Provider, ProviderError, ProviderReply};

/// Target languages DeepL serves, lowercase base codes.
const SUPPORTED: &[&str] = &[
    "bg", "cs", "da", "de", "el", "en", "es", "et", "fi", "fr", "hu", "id", "it", "ja", "ko",
    "lt", "lv", "nb", "nl", "pl", "pt", "ro", "ru", "sk", "sl", "sv", "tr", "uk", "zh",
];

pub struct DeepLProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl DeepLProvider {
    /// `base_url` distinguishes the free and pro endpoints.
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api-free.deepl.com".to_string()),
        })
    }
}

#[async_trait::async_trait]
impl Provider for DeepLProvider {
    fn id(&self) -> &str {
        "deepl"
    }

    fn priority(&self) -> u8 {
        90
    }

    fn supported_languages(&self) -> Option<Vec<String>> {
        Some(SUPPORTED.iter().map(|l| l.to_string()).collect())
    }

    async fn translate(
        &self,
        text: &str,
        src: &str,
        tgt: &str,
        cancel: &CancellationToken,
    ) -> Result<ProviderReply, ProviderError> {
        let params = [
            ("text", text.to_string()),
            ("source_lang", src.to_uppercase()),
            ("target_lang", tgt.to_uppercase()),
        ];

        let request = self
            .http
            .post(format!("{}/v2/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&params)
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

        let first = body
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Api("empty translations array".to_string()))?;

        Ok(ProviderReply::Shaped {
            text: first.text,
            detected_src: first
                .detected_source_language
                .map(|l| l.to_lowercase()),
            confidence: None,
        })
    }
}

#[derive(Deserialize)]
struct TranslateBody {
    translations: Vec<TranslationItem>,
}

#[derive(Deserialize)]
struct TranslationItem {
    text: String,
    detected_source_language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::supports_target;

    #[test]
    fn advertises_its_language_set() {
        let p = DeepLProvider::new("key".into(), None).unwrap();
        assert!(supports_target(&p, "de"));
        assert!(supports_target(&p, "ja"));
        assert!(!supports_target(&p, "sw"));
    }
}
