//! Deterministic text cleanup applied before detection/translation and
//! reversed on output. Escapes mass-mention triggers so downstream chat
//! platforms cannot be abused via translated or pass-through text.

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Zero-width space inserted after mention trigger characters.
const ZWSP: char = '\u{200B}';

/// Text normalizer with a configurable input length cap.
pub struct Normalizer {
    max_len: usize,
    mention: Regex,
    escaped_mention: Regex,
    space_runs: Regex,
    trailing_space: Regex,
    blank_lines: Regex,
    tilde_fence: Regex,
}

impl Normalizer {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            mention: Regex::new(r"@(everyone|here)").unwrap(),
            escaped_mention: Regex::new(r"@\x{200B}(everyone|here)").unwrap(),
            space_runs: Regex::new(r"[ \t]{2,}").unwrap(),
            trailing_space: Regex::new(r"[ \t]+\n").unwrap(),
            blank_lines: Regex::new(r"\n{3,}").unwrap(),
            tilde_fence: Regex::new(r"(?m)^~~~+").unwrap(),
        }
    }

    /// Clean text for detection/translation.
    /// NFKC also folds fullwidth fence backticks and `…` into ASCII forms.
    pub fn preprocess(&self, text: &str) -> String {
        let mut out: String = text.nfkc().collect();
        out = fold_quotes(&out);
        out = out.replace("\r\n", "\n").replace('\r', "\n");
        out = self.tilde_fence.replace_all(&out, "```").into_owned();
        out = self.space_runs.replace_all(&out, " ").into_owned();
        out = self.trailing_space.replace_all(&out, "\n").into_owned();
        out = self.blank_lines.replace_all(&out, "\n\n").into_owned();
        out = self
            .mention
            .replace_all(&out, format!("@{ZWSP}$1").as_str())
            .into_owned();
        if out.chars().count() > self.max_len {
            out = truncate_at_boundary(&out, self.max_len);
        }
        out
    }

    /// Reverse the escaping and re-collapse whitespace on provider output.
    pub fn postprocess(&self, text: &str) -> String {
        let mut out = self
            .escaped_mention
            .replace_all(text, "@$1")
            .into_owned();
        out = self.tilde_fence.replace_all(&out, "```").into_owned();
        out = self.space_runs.replace_all(&out, " ").into_owned();
        out = self.trailing_space.replace_all(&out, "\n").into_owned();
        out = self.blank_lines.replace_all(&out, "\n\n").into_owned();
        out
    }

    /// Split text into chunks of at most `max_size` chars, preferring
    /// paragraph then newline then word boundaries.
    pub fn split_into_chunks(&self, text: &str, max_size: usize) -> Vec<String> {
        let mut chunks = Vec::new();
        if max_size == 0 {
            return chunks;
        }
        let mut rest = text;
        while !rest.is_empty() {
            if rest.chars().count() <= max_size {
                chunks.push(rest.to_string());
                break;
            }
            let window = char_prefix(rest, max_size);
            let cut = window
                .rfind("\n\n")
                .or_else(|| window.rfind('\n'))
                .or_else(|| window.rfind(' '))
                .filter(|&i| i > 0)
                .unwrap_or(window.len());
            chunks.push(rest[..cut].to_string());
            rest = rest[cut..].trim_start_matches(['\n', ' ']);
        }
        chunks.retain(|c| !c.is_empty());
        chunks
    }
}

/// Curly quote folding. NFKC leaves these untouched, so map them by hand.
fn fold_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2039}' | '\u{203A}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{00AB}' | '\u{00BB}' => '"',
            c => c,
        })
        .collect()
}

/// Byte length of the first `n` chars of `s` (or all of `s` if shorter),
/// returned as a prefix slice.
fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cut over-long text at the best boundary inside the cap and mark the cut.
fn truncate_at_boundary(text: &str, max_len: usize) -> String {
    // Leave room for the ellipsis marker.
    let window = char_prefix(text, max_len.saturating_sub(3));
    let cut = window
        .rfind("\n\n")
        .or_else(|| window.rfind('\n'))
        .or_else(|| window.rfind(' '))
        .filter(|&i| i > 0)
        .unwrap_or(window.len());
    let mut out = text[..cut].trim_end().to_string();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm() -> Normalizer {
        Normalizer::new(3000)
    }

    #[test]
    fn roundtrip_for_clean_ascii() {
        let n = norm();
        let corpus = [
            "Hello, world.",
            "One sentence. Another sentence follows it.",
            "A line\nand a second line.",
            "A paragraph.\n\nAnother paragraph.",
        ];
        for text in corpus {
            assert_eq!(n.postprocess(&n.preprocess(text)), text);
        }
    }

    #[test]
    fn mentions_are_escaped_and_restored() {
        let n = norm();
        let pre = n.preprocess("warning @everyone and @here now");
        assert!(!pre.contains("@everyone"));
        assert!(pre.contains('\u{200B}'));
        let post = n.postprocess(&pre);
        assert_eq!(post, "warning @everyone and @here now");
    }

    #[test]
    fn unicode_punctuation_is_folded() {
        let n = norm();
        assert_eq!(n.preprocess("\u{201C}hi\u{201D} there\u{2026}"), "\"hi\" there...");
        assert_eq!(n.preprocess("it\u{2019}s"), "it's");
    }

    #[test]
    fn whitespace_collapses_to_one_blank_line() {
        let n = norm();
        assert_eq!(n.preprocess("a  \t b"), "a b");
        assert_eq!(n.preprocess("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(n.preprocess("a \r\nb"), "a\nb");
    }

    #[test]
    fn over_limit_text_is_cut_at_paragraph() {
        let n = Normalizer::new(40);
        let text = format!("{}\n\n{}", "first paragraph here", "x".repeat(60));
        let out = n.preprocess(&text);
        assert!(out.ends_with("..."));
        assert!(out.starts_with("first paragraph here"));
        assert!(out.chars().count() <= 40);
    }

    #[test]
    fn chunks_prefer_paragraph_boundaries() {
        let n = norm();
        let text = "aaa bbb.\n\nccc ddd.\n\neee fff.";
        let chunks = n.split_into_chunks(text, 12);
        assert_eq!(chunks, vec!["aaa bbb.", "ccc ddd.", "eee fff."]);
    }

    #[test]
    fn chunking_falls_back_to_words_and_hard_cuts() {
        let n = norm();
        let chunks = n.split_into_chunks("one two three four", 9);
        assert_eq!(chunks, vec!["one two", "three", "four"]);
        let hard = n.split_into_chunks("abcdefghij", 4);
        assert_eq!(hard, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn tilde_fences_are_normalized() {
        let n = norm();
        assert_eq!(n.preprocess("~~~\ncode\n~~~"), "```\ncode\n```");
    }
}
