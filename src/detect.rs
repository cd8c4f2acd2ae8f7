//! Source-language detection behind one uniform async interface.
//! Model-backed and heuristic detectors register the same way; the pure
//! Unicode-range heuristic is the planner's ultimate fallback.

use async_trait::async_trait;

/// Detection outcome: base code plus confidence in [0, 1].
#[derive(Debug, Clone)]
pub struct Detection {
    pub lang: String,
    pub confidence: f64,
}

#[derive(Debug)]
pub enum DetectError {
    /// The detector produced no answer it would stand behind.
    Unreliable,
    Failed(String),
}

impl std::fmt::Display for DetectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectError::Unreliable => write!(f, "detection unreliable"),
            DetectError::Failed(msg) => write!(f, "detection failed: {msg}"),
        }
    }
}

/// Pluggable source-language detector.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, text: &str) -> Result<Detection, DetectError>;
}

/// Statistical trigram detector backed by whatlang.
pub struct WhatlangDetector;

#[async_trait]
impl Detector for WhatlangDetector {
    async fn detect(&self, text: &str) -> Result<Detection, DetectError> {
        let info = whatlang::detect(text).ok_or(DetectError::Unreliable)?;
        if !info.is_reliable() {
            return Err(DetectError::Unreliable);
        }
        Ok(Detection {
            lang: lang_to_code(info.lang()).to_string(),
            confidence: info.confidence(),
        })
    }
}

fn lang_to_code(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang::*;
    match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Tha => "th",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        Swe => "sv",
        Dan => "da",
        Fin => "fi",
        Ell => "el",
        Heb => "he",
        Ind => "id",
        Ces => "cs",
        Ron => "ro",
        Hun => "hu",
        Bul => "bg",
        // Anything rarer keeps its ISO 639-3 code rather than guessing.
        other => other.code(),
    }
}

/// Wrap a synchronous detection function once, at registration time.
pub struct SyncDetector<F>
where
    F: Fn(&str) -> Option<(String, f64)> + Send + Sync,
{
    func: F,
}

impl<F> SyncDetector<F>
where
    F: Fn(&str) -> Option<(String, f64)> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Detector for SyncDetector<F>
where
    F: Fn(&str) -> Option<(String, f64)> + Send + Sync,
{
    async fn detect(&self, text: &str) -> Result<Detection, DetectError> {
        match (self.func)(text) {
            Some((lang, confidence)) => Ok(Detection { lang, confidence }),
            None => Err(DetectError::Unreliable),
        }
    }
}

/// Pure Unicode-range heuristic: scans for the first script-distinctive
/// character and keys it to a code; Latin text defaults to "en".
pub fn script_heuristic(text: &str) -> &'static str {
    for c in text.chars() {
        match c {
            '\u{3040}'..='\u{30FF}' => return "ja", // hiragana + katakana
            '\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => return "ko",
            '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => return "zh",
            '\u{0400}'..='\u{04FF}' => return "ru",
            '\u{0600}'..='\u{06FF}' => return "ar",
            '\u{0590}'..='\u{05FF}' => return "he",
            '\u{0E00}'..='\u{0E7F}' => return "th",
            '\u{0900}'..='\u{097F}' => return "hi",
            '\u{0370}'..='\u{03FF}' => return "el",
            _ => {}
        }
    }
    "en"
}
