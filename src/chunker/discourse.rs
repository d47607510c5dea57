//! Discourse analysis backing the chunking-strategy decision.
//!
//! Produces a feature snapshot (sentence statistics, marker counts, a crude
//! coreference chain list) and classifies the content type from it. Marker
//! tables are per-language with a fallback list for languages we have no
//! table for; the booster keyword lists are English-centric by design and
//! degrade silently elsewhere.

use crate::chunker::ContentType;
use crate::nlp::{char_len, Span};
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Feature snapshot from one pass of discourse analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscourseFeatures {
    pub sentence_count: usize,
    /// Average sentence length in characters.
    pub avg_sentence_length: f64,
    /// Terminal/clause punctuation count divided by text length.
    pub punctuation_density: f64,
    /// Distinct discourse connectors present.
    pub connector_count: usize,
    /// Distinct emotive words / emoji present.
    pub emotion_indicators: usize,
    /// Total technical-term pattern matches.
    pub technical_terms: usize,
    /// `(earlier, later)` sentence index pairs linked by a referential pronoun.
    pub coreference_chains: Vec<(usize, usize)>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Marker tables
// ─────────────────────────────────────────────────────────────────────────────

struct MarkerSet {
    connectors: AhoCorasick,
    emotive: AhoCorasick,
}

fn build_matcher(patterns: &[&str]) -> AhoCorasick {
    AhoCorasick::new(patterns).expect("invalid marker pattern set")
}

static MARKERS_EN: Lazy<MarkerSet> = Lazy::new(|| MarkerSet {
    connectors: build_matcher(&[
        "however",
        "therefore",
        "furthermore",
        "moreover",
        "consequently",
        "meanwhile",
    ]),
    emotive: build_matcher(&["amazing", "terrible", "wonderful", "awful", "love", "hate"]),
});

static MARKERS_RU: Lazy<MarkerSet> = Lazy::new(|| MarkerSet {
    connectors: build_matcher(&[
        "однако",
        "поэтому",
        "кроме того",
        "более того",
        "следовательно",
        "тем временем",
    ]),
    emotive: build_matcher(&[
        "удивительно",
        "ужасно",
        "замечательно",
        "отвратительно",
        "люблю",
        "ненавижу",
    ]),
});

static MARKERS_DEFAULT: Lazy<MarkerSet> = Lazy::new(|| MarkerSet {
    connectors: build_matcher(&["but", "and", "or", "so", "then", "also"]),
    emotive: build_matcher(&[":)", ":(", "😊", "😢", "😍", "😠"]),
});

fn markers_for(lang: &str) -> &'static MarkerSet {
    match lang {
        "en" => &MARKERS_EN,
        "ru" => &MARKERS_RU,
        _ => &MARKERS_DEFAULT,
    }
}

// English booster lists used by the classifier only.
static EMOTIONAL_KEYWORDS: Lazy<AhoCorasick> = Lazy::new(|| {
    build_matcher(&[
        "amazing",
        "incredible",
        "grateful",
        "terrified",
        "overwhelming",
        "crying",
        "joy",
        "believe",
        "absolutely",
    ])
});

static EMOTIONAL_PHRASES: Lazy<AhoCorasick> = Lazy::new(|| {
    build_matcher(&[
        "can't believe",
        "so grateful",
        "absolutely amazing",
        "this is incredible",
    ])
});

static CONVERSATIONAL_MARKERS: Lazy<AhoCorasick> = Lazy::new(|| {
    build_matcher(&["hey", "how are you", "did you", "pretty crazy", "stuff happening"])
});

static TECHNICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b\w+\(\)",             // function-call shape
        r"\b[A-Z]{2,}[a-z]*\b",   // acronyms
        r"\b\d+\.\d+\b",          // version numbers
        r"\b[a-zA-Z]+_[a-zA-Z]+\b", // snake_case identifiers
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid technical pattern"))
    .collect()
});

const REFERENTIAL_PRONOUNS: [&str; 8] =
    ["he", "she", "it", "they", "this", "that", "these", "those"];

/// Number of distinct patterns from `matcher` occurring in `haystack`.
fn distinct_matches(matcher: &AhoCorasick, haystack: &str) -> usize {
    let mut seen: HashSet<usize> = HashSet::new();
    for m in matcher.find_iter(haystack) {
        seen.insert(m.pattern().as_usize());
    }
    seen.len()
}

fn any_match(matcher: &AhoCorasick, haystack: &str) -> bool {
    matcher.is_match(haystack)
}

// ─────────────────────────────────────────────────────────────────────────────
// Language resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve `auto` to a concrete code via whatlang; pass through otherwise.
///
/// Unmapped detections fall back to the detected ISO 639-3 code, which simply
/// selects the default marker tables downstream.
pub fn resolve_language(source_lang: &str, text: &str) -> String {
    if source_lang != "auto" {
        return source_lang.to_string();
    }
    let Some(info) = whatlang::detect(text) else {
        return source_lang.to_string();
    };
    let code = info.lang().code();
    match code {
        "eng" => "en",
        "rus" => "ru",
        "spa" => "es",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "por" => "pt",
        "ukr" => "uk",
        other => other,
    }
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the discourse snapshot for `text` (already split into sentences).
pub fn analyze(text: &str, sentences: &[Span], lang: &str) -> DiscourseFeatures {
    let sentence_count = sentences.len();
    let avg_sentence_length = if sentence_count == 0 {
        0.0
    } else {
        sentences.iter().map(|s| s.char_len()).sum::<usize>() as f64 / sentence_count as f64
    };

    let text_chars = char_len(text);
    let punctuation_count = text.chars().filter(|c| "!?.,;:".contains(*c)).count();
    let punctuation_density = if text_chars == 0 {
        0.0
    } else {
        punctuation_count as f64 / text_chars as f64
    };

    let lower = text.to_lowercase();
    let markers = markers_for(lang);
    let connector_count = distinct_matches(&markers.connectors, &lower);
    let emotion_indicators = distinct_matches(&markers.emotive, &lower);

    let technical_terms = TECHNICAL_PATTERNS
        .iter()
        .map(|p| p.find_iter(text).count())
        .sum();

    DiscourseFeatures {
        sentence_count,
        avg_sentence_length,
        punctuation_density,
        connector_count,
        emotion_indicators,
        technical_terms,
        coreference_chains: detect_coreference_chains(sentences),
    }
}

/// Link each sentence containing a referential pronoun to its predecessor.
fn detect_coreference_chains(sentences: &[Span]) -> Vec<(usize, usize)> {
    let mut chains = Vec::new();
    for (i, sentence) in sentences.iter().enumerate().skip(1) {
        let lower = sentence.text.to_lowercase();
        let words: HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if REFERENTIAL_PRONOUNS.iter().any(|p| words.contains(p)) {
            chains.push((i - 1, i));
        }
    }
    chains
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Select the content type driving the chunking strategy.
///
/// Emotive words and emoji feed the indicator term; `!` and `?` contribute
/// through punctuation density only, so a bare greeting with an exclamation
/// mark stays conversational.
pub fn classify(text: &str, features: &DiscourseFeatures) -> ContentType {
    let lower = text.to_lowercase();

    let mut emotional_score =
        features.emotion_indicators as f64 * 2.0 + features.punctuation_density * 10.0;
    let keyword_count = distinct_matches(&EMOTIONAL_KEYWORDS, &lower);
    if keyword_count >= 2 || any_match(&EMOTIONAL_PHRASES, &lower) {
        emotional_score += 5.0;
    }

    let technical_score = features.technical_terms as f64 * 3.0
        + if features.avg_sentence_length > 25.0 { 1.0 } else { 0.0 };

    let mut conversational_indicators = 0usize;
    if features.avg_sentence_length < 20.0 {
        conversational_indicators += 1;
    }
    if char_len(text) < 500 {
        conversational_indicators += 1;
    }
    if any_match(&CONVERSATIONAL_MARKERS, &lower) {
        conversational_indicators += 2;
    }

    if emotional_score > 3.0 {
        ContentType::Emotional
    } else if technical_score > 2.0 {
        ContentType::Technical
    } else if conversational_indicators >= 2 {
        ContentType::Conversational
    } else if features.sentence_count > 5 && features.avg_sentence_length > 20.0 {
        ContentType::Narrative
    } else {
        ContentType::Formal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::split_sentences;

    fn features_of(text: &str, lang: &str) -> DiscourseFeatures {
        analyze(text, &split_sentences(text), lang)
    }

    #[test]
    fn greeting_with_exclamation_is_conversational() {
        let text = "Hello, world!";
        let features = features_of(text, "en");
        assert_eq!(classify(text, &features), ContentType::Conversational);
    }

    #[test]
    fn emphatic_text_is_emotional() {
        let text = "I can't believe this is happening!!! This is absolutely incredible!";
        let features = features_of(text, "en");
        assert_eq!(classify(text, &features), ContentType::Emotional);
    }

    #[test]
    fn identifier_heavy_prose_is_technical() {
        let text = "The parse_config() helper reads the TOML manifest and returns a \
                    config_table struct. Versions 1.2 and 2.0 of the CLI accept the \
                    same flags for the build_graph() pass.";
        let features = features_of(text, "en");
        assert!(features.technical_terms >= 2);
        assert_eq!(classify(text, &features), ContentType::Technical);
    }

    #[test]
    fn long_flowing_prose_is_narrative() {
        let text = "The caravan moved slowly through the valley as evening settled over the hills. \
                    Lanterns swung gently from the lead wagon while the drivers talked in low voices. \
                    Nobody wanted to stop before the river crossing though the horses were tired. \
                    The old guide remembered a shortcut from decades earlier and weighed the risk. \
                    Clouds gathered quietly behind the ridge without anyone paying much attention. \
                    By the time the rain began they had already found shelter beneath the cedars.";
        let features = features_of(text, "en");
        assert_eq!(classify(text, &features), ContentType::Narrative);
    }

    #[test]
    fn russian_marker_table_is_used() {
        let text = "Однако я люблю этот город. Поэтому мы остаёмся здесь.";
        let features = features_of(text, "ru");
        assert!(features.connector_count >= 2);
        assert!(features.emotion_indicators >= 1);
    }

    #[test]
    fn coreference_links_adjacent_sentences() {
        let text = "Maria opened the workshop. She had waited years for this.";
        let features = features_of(text, "en");
        assert_eq!(features.coreference_chains, vec![(0, 1)]);
    }

    #[test]
    fn resolve_language_passes_concrete_codes_through() {
        assert_eq!(resolve_language("de", "whatever"), "de");
    }

    #[test]
    fn resolve_language_detects_english() {
        let text = "The quick brown fox jumps over the lazy dog near the river bank.";
        assert_eq!(resolve_language("auto", text), "en");
    }
}
