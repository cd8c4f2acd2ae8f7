//! Maps arbitrary user-supplied tokens ("French", "pt-BR", a flag emoji) to
//! canonical base language codes. Resolution never invents codes: a token
//! with no reasonable mapping yields None and the caller decides what to do.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;

/// Seed alias table: code, then aliases (names, legacy codes, flags).
const ALIAS_SEED: &[(&str, &[&str])] = &[
    ("en", &["english", "eng", "anglais", "🇺🇸", "🇬🇧"]),
    ("fr", &["french", "francais", "fra", "fre", "🇫🇷"]),
    ("de", &["german", "deutsch", "ger", "deu", "🇩🇪"]),
    ("es", &["spanish", "espanol", "spa", "castellano", "🇪🇸", "🇲🇽"]),
    ("it", &["italian", "italiano", "ita", "🇮🇹"]),
    ("pt", &["portuguese", "portugues", "por", "pt-br", "pt-pt", "brazilian", "🇧🇷", "🇵🇹"]),
    ("ru", &["russian", "russkiy", "rus", "🇷🇺"]),
    ("ja", &["japanese", "nihongo", "jpn", "jp", "🇯🇵"]),
    ("zh", &["chinese", "mandarin", "zho", "chi", "zh-cn", "zh-tw", "cn", "🇨🇳", "🇹🇼"]),
    ("ko", &["korean", "kor", "kr", "🇰🇷"]),
    ("ar", &["arabic", "ara", "🇸🇦"]),
    ("hi", &["hindi", "hin", "🇮🇳"]),
    ("nl", &["dutch", "nederlands", "nld", "dut", "🇳🇱"]),
    ("pl", &["polish", "polski", "pol", "🇵🇱"]),
    ("tr", &["turkish", "turkce", "tur", "🇹🇷"]),
    ("uk", &["ukrainian", "ukr", "🇺🇦"]),
    ("vi", &["vietnamese", "vie", "🇻🇳"]),
    ("th", &["thai", "tha", "🇹🇭"]),
    ("sv", &["swedish", "svenska", "swe", "🇸🇪"]),
    ("no", &["norwegian", "norsk", "nor", "nb", "nn", "🇳🇴"]),
    ("da", &["danish", "dansk", "dan", "🇩🇰"]),
    ("fi", &["finnish", "suomi", "fin", "🇫🇮"]),
    ("el", &["greek", "ell", "gre", "🇬🇷"]),
    ("he", &["hebrew", "heb", "iw", "🇮🇱"]),
    ("id", &["indonesian", "ind", "🇮🇩"]),
    ("cs", &["czech", "cestina", "ces", "cze", "🇨🇿"]),
    ("ro", &["romanian", "ron", "rum", "🇷🇴"]),
    ("hu", &["hungarian", "magyar", "hun", "🇭🇺"]),
    ("bg", &["bulgarian", "bul", "🇧🇬"]),
];

/// Alias/ambiguity helper resolving user tokens to base codes.
/// Extensible at runtime; safe for concurrent use.
pub struct LanguageResolver {
    aliases: RwLock<HashMap<String, String>>,
    base_codes: RwLock<HashSet<String>>,
    fuzzy_threshold: f64,
}

impl LanguageResolver {
    pub fn new(fuzzy_threshold: f64) -> Self {
        let mut aliases = HashMap::new();
        let mut base_codes = HashSet::new();
        for (code, names) in ALIAS_SEED {
            base_codes.insert((*code).to_string());
            aliases.insert((*code).to_string(), (*code).to_string());
            for name in *names {
                aliases.insert(normalize_token(name), (*code).to_string());
            }
        }
        Self {
            aliases: RwLock::new(aliases),
            base_codes: RwLock::new(base_codes),
            fuzzy_threshold,
        }
    }

    /// Register one alias at runtime. The code is also registered as a base
    /// code so fuzzy matching can reach it.
    pub fn add_alias(&self, code: &str, alias: &str) {
        let code = normalize_token(code);
        self.aliases
            .write()
            .insert(normalize_token(alias), code.clone());
        self.base_codes.write().insert(code);
    }

    /// Bulk-load an external alias map keyed by canonical language name.
    pub fn load_aliases(&self, map: &HashMap<String, String>) {
        for (name, code) in map {
            self.add_alias(code, name);
        }
    }

    /// Resolve a token to a base code, or None if nothing reasonable maps.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let needle = normalize_token(token);
        if needle.is_empty() {
            return None;
        }

        let aliases = self.aliases.read();
        if let Some(code) = aliases.get(&needle) {
            return Some(code.clone());
        }

        // Hyphen/space variant swap: "pt br" <-> "pt-br".
        let swapped = if needle.contains('-') {
            needle.replace('-', " ")
        } else {
            needle.replace(' ', "-")
        };
        if let Some(code) = aliases.get(&swapped) {
            return Some(code.clone());
        }

        // Regional form whose base part is already known: "fr-ca" -> "fr".
        let base_codes = self.base_codes.read();
        if let Some(prefix) = needle.split('-').next() {
            if prefix.len() >= 2 && prefix != needle && base_codes.contains(prefix) {
                return Some(prefix.to_string());
            }
        }

        // Fuzzy over aliases ("frennch" -> "french").
        let mut best: Option<(f64, &String)> = None;
        for (alias, code) in aliases.iter() {
            let score = similarity(&needle, alias);
            if score >= self.fuzzy_threshold
                && best.map(|(s, _)| score > s).unwrap_or(true)
            {
                best = Some((score, code));
            }
        }
        if let Some((_, code)) = best {
            return Some(code.clone());
        }

        // Fuzzy over base codes tolerates one-off typos like "js" for "ja".
        if needle.len() <= 3 {
            let mut candidates: Vec<&String> = base_codes
                .iter()
                .filter(|code| levenshtein(&needle, code) <= 1)
                .collect();
            candidates.sort_by_key(|code| {
                let shared = code
                    .chars()
                    .zip(needle.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                (std::cmp::Reverse(shared), (*code).clone())
            });
            if let Some(code) = candidates.first() {
                return Some((*code).to_string());
            }
        }

        // Literal acceptance for anything already shaped like a code.
        if needle.len() >= 2
            && needle.len() <= 3
            && needle.chars().all(|c| c.is_ascii_lowercase())
        {
            return Some(needle);
        }

        None
    }
}

/// Lowercase, underscore-to-hyphen, diacritic-stripped form of a token.
fn normalize_token(token: &str) -> String {
    token
        .trim()
        .to_lowercase()
        .replace('_', "-")
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{20D0}'..='\u{20FF}')
}

/// Normalized similarity in [0, 1] from edit distance.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
