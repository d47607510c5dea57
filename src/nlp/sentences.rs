//! Offset-preserving sentence and paragraph segmentation.
//!
//! Splits on runs of terminal punctuation (`.`, `!`, `?`) followed by
//! whitespace or end of input, keeping the punctuation with its sentence.
//! Offsets are byte positions into the original text so spans stay exact for
//! chunk-boundary reporting.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("invalid sentence end regex"));

/// One sentence with its half-open `[start, end)` byte span in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Sentence length in characters (chunk sizes are measured in chars).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Character count of a str; the unit all chunk-size limits are measured in.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into sentences with byte offsets.
///
/// A trailing fragment without terminal punctuation is kept as a sentence of
/// its own; whitespace-only fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<Span> {
    let mut sentences = Vec::new();
    let mut cursor = 0usize;

    for m in SENTENCE_END.find_iter(text) {
        push_trimmed(&mut sentences, text, cursor, m.end());
        cursor = m.end();
    }
    if cursor < text.len() {
        push_trimmed(&mut sentences, text, cursor, text.len());
    }

    sentences
}

/// Split `text` into paragraphs on blank-line boundaries, with byte offsets.
pub fn split_paragraphs(text: &str) -> Vec<Span> {
    let mut paragraphs = Vec::new();
    let mut pos = 0usize;
    for part in text.split("\n\n") {
        push_trimmed(&mut paragraphs, text, pos, pos + part.len());
        pos += part.len() + 2;
    }
    paragraphs
}

/// Record the trimmed region of `text[start..end]`, skipping empty regions.
fn push_trimmed(out: &mut Vec<Span>, text: &str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = raw.len() - raw.trim_start().len();
    let span_start = start + lead;
    out.push(Span {
        text: trimmed.to_string(),
        start: span_start,
        end: span_start + trimmed.len(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("First one. Second one! Third one?");
        let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["First one.", "Second one!", "Third one?"]);
    }

    #[test]
    fn offsets_point_into_the_source() {
        let text = "Alpha beta. Gamma delta.";
        let sentences = split_sentences(text);
        for s in &sentences {
            assert_eq!(&text[s.start..s.end], s.text);
        }
    }

    #[test]
    fn offsets_are_monotone_and_non_overlapping() {
        let sentences = split_sentences("One. Two. Three. Four.");
        for pair in sentences.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn keeps_unterminated_tail() {
        let sentences = split_sentences("Done here. and a tail fragment");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[1].text, "and a tail fragment");
    }

    #[test]
    fn punctuation_runs_stay_with_the_sentence() {
        let sentences = split_sentences("Unbelievable!!! Really?");
        assert_eq!(sentences[0].text, "Unbelievable!!!");
        assert_eq!(sentences[1].text, "Really?");
    }

    #[test]
    fn single_sentence_without_punctuation() {
        let sentences = split_sentences("hello world");
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].start, 0);
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "Para one line.\n\nPara two line.\n\n\nPara three.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0].text, "Para one line.");
        assert_eq!(paragraphs[2].text, "Para three.");
        for p in &paragraphs {
            assert_eq!(&text[p.start..p.end], p.text);
        }
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_sentences("   ").is_empty());
        assert!(split_paragraphs("").is_empty());
    }
}
