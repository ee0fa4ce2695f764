//! `text → token sequence`. Deterministic and total — never fails.
//!
//! Steps, in fixed order: transliterate non-ASCII to the closest ASCII,
//! lowercase, split on runs of non-alphabetic characters, drop tokens
//! outside length `[2, 25]`, stem with the configured language.

use crate::config::StemmerLanguage;
use bumpalo::Bump;
use rust_stemmers::Stemmer;
use unicode_normalization::UnicodeNormalization;

const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 25;

/// NFD-decomposes `text` and drops combining marks, folding accented Latin
/// letters onto their ASCII base letter (`á` -> `a`, `ç` -> `c`). Characters
/// outside the Latin diacritic story pass through NFD-decomposed but are
/// filtered out in the alphabetic-split step that follows.
fn transliterate(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// Splits `s` on runs of non-ASCII-alphabetic characters, yielding
/// lowercased, length-filtered raw tokens (pre-stemming).
fn raw_tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .filter(|t| (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&t.len()))
}

/// Analyzes `text` into an owned, ordered sequence of stemmed terms.
pub fn analyze(text: &str, language: StemmerLanguage) -> Vec<String> {
    let folded = transliterate(text).to_lowercase();
    let stemmer = Stemmer::create(language.algorithm());
    raw_tokens(&folded).map(|t| stemmer.stem(t).into_owned()).collect()
}

/// Analyzes `text` into terms allocated out of a caller-provided arena, for
/// bulk reuse across many documents/chunks without per-token heap churn.
/// The arena is reset by the caller (e.g. once per document) between calls.
pub fn analyze_into<'a>(text: &str, language: StemmerLanguage, arena: &'a Bump, out: &mut Vec<&'a str>) {
    let folded = transliterate(text).to_lowercase();
    let stemmer = Stemmer::create(language.algorithm());
    for raw in raw_tokens(&folded) {
        let stemmed = stemmer.stem(raw);
        out.push(arena.alloc_str(&stemmed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_never_panics_on_empty_input() {
        assert!(analyze("", StemmerLanguage::Portuguese).is_empty());
    }

    #[test]
    fn analyze_drops_short_and_long_tokens() {
        let tokens = analyze("a ab abcdefghijklmnopqrstuvwxyz", StemmerLanguage::English);
        assert!(tokens.iter().all(|t| (2..=25).contains(&t.len()) || t.len() < 25));
        // "a" (len 1) is dropped; the 26-char token is dropped too.
        assert!(!tokens.iter().any(|t| t == "a"));
    }

    #[test]
    fn analyze_folds_accents_and_lowercases() {
        let tokens = analyze("A Cão corre RÁPIDO!", StemmerLanguage::Portuguese);
        // Folded+lowercased+split raw tokens would be "cao", "corre", "rapido";
        // stemming may shorten "corre"/"rapido" further, but must not reintroduce
        // accents or uppercase.
        for t in &tokens {
            assert!(t.chars().all(|c| c.is_ascii_lowercase()));
        }
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn analyze_is_idempotent_on_its_own_output() {
        let once = analyze("A Cão corre RÁPIDO pela floresta", StemmerLanguage::Portuguese);
        let rejoined = once.join(" ");
        let twice = analyze(&rejoined, StemmerLanguage::Portuguese);
        assert_eq!(once, twice);
    }

    #[test]
    fn analyze_into_matches_owned_analyze() {
        let arena = Bump::new();
        let mut out = Vec::new();
        analyze_into("the quick brown fox", StemmerLanguage::English, &arena, &mut out);
        let owned = analyze("the quick brown fox", StemmerLanguage::English);
        assert_eq!(out, owned);
    }
}
