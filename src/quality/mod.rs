//! Multi-dimensional translation quality assessment.
//!
//! Scores an (original, translation) pair across eight weighted dimensions
//! and folds them into an overall score, a letter grade, a 95% confidence
//! interval, and canned improvement suggestions. Never fails: an empty
//! translation scores all zeros, missing embedders degrade to neutral 0.7,
//! and unsupported target languages degrade the fluency dimension the same
//! way. The fluency and entity pattern tables are English-centric on purpose
//! and are treated as configuration, not something to grow implicitly.

use crate::backend::Embedder;
use crate::core::types::Metadata;
use crate::nlp::{self, char_len, cosine_similarity, mean_adjacent_similarity};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Dimensions and grades
// ─────────────────────────────────────────────────────────────────────────────

/// The eight assessment dimensions. Weights are fixed and sum to 1.0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Confidence,
    LengthRatio,
    StructureIntegrity,
    NamedEntityPreservation,
    BoundaryCoherence,
    SemanticSimilarity,
    Fluency,
    Consistency,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 8] = [
        Self::Confidence,
        Self::LengthRatio,
        Self::StructureIntegrity,
        Self::NamedEntityPreservation,
        Self::BoundaryCoherence,
        Self::SemanticSimilarity,
        Self::Fluency,
        Self::Consistency,
    ];

    pub fn weight(self) -> f64 {
        match self {
            Self::Confidence => 0.18,
            Self::LengthRatio => 0.12,
            Self::StructureIntegrity => 0.12,
            Self::NamedEntityPreservation => 0.12,
            Self::BoundaryCoherence => 0.10,
            Self::SemanticSimilarity => 0.15,
            Self::Fluency => 0.11,
            Self::Consistency => 0.10,
        }
    }

    fn suggestion(self) -> Option<&'static str> {
        match self {
            Self::Confidence => {
                Some("Consider a different chunking strategy for better model confidence")
            }
            Self::LengthRatio => {
                Some("Translation length ratio suggests potential over/under-translation")
            }
            Self::StructureIntegrity => {
                Some("Text structure not well preserved - adjust chunking boundaries")
            }
            Self::NamedEntityPreservation => {
                Some("Named entities not properly preserved - use entity-aware chunking")
            }
            Self::BoundaryCoherence => Some("Chunk boundaries create semantic discontinuity"),
            Self::SemanticSimilarity => {
                Some("Semantic meaning not well preserved - try larger chunks")
            }
            Self::Fluency => Some("Target language fluency could be improved"),
            Self::Consistency => None,
        }
    }
}

/// Letter grade derived from the overall score. Monotone: a higher score
/// never yields a lower grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
    F,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::A
        } else if score >= 0.8 {
            Self::B
        } else if score >= 0.7 {
            Self::C
        } else if score >= 0.6 {
            Self::D
        } else {
            Self::F
        }
    }

    /// Rank for monotonicity comparisons; higher is better.
    pub fn rank(self) -> u8 {
        match self {
            Self::A => 4,
            Self::B => 3,
            Self::C => 2,
            Self::D => 1,
            Self::F => 0,
        }
    }
}

/// Full assessment output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall_score: f64,
    pub dimension_scores: BTreeMap<QualityDimension, f64>,
    /// 95% interval over the dimension sample, widened to bracket the
    /// weighted overall score.
    pub confidence_interval: (f64, f64),
    pub quality_grade: QualityGrade,
    pub optimization_needed: bool,
    pub improvement_suggestions: Vec<String>,
    pub metadata: Metadata,
}

/// Input to one assessment.
#[derive(Debug, Clone, Default)]
pub struct TranslationPair {
    pub original: String,
    pub translation: String,
    pub chunks_original: Option<Vec<String>>,
    pub chunks_translated: Option<Vec<String>>,
    pub model_confidence: Option<f64>,
    pub language_pair: Option<(String, String)>,
}

impl TranslationPair {
    pub fn new(original: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            translation: translation.into(),
            ..Default::default()
        }
    }

    pub fn with_chunks(mut self, original: Vec<String>, translated: Vec<String>) -> Self {
        self.chunks_original = Some(original);
        self.chunks_translated = Some(translated);
        self
    }

    pub fn with_language_pair(mut self, src: impl Into<String>, tgt: impl Into<String>) -> Self {
        self.language_pair = Some((src.into(), tgt.into()));
        self
    }

    pub fn with_model_confidence(mut self, confidence: f64) -> Self {
        self.model_confidence = Some(confidence);
        self
    }
}

/// Winner of a two-translation comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonWinner {
    First,
    Second,
}

/// Side-by-side assessment of two candidate translations.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationComparison {
    pub first: QualityMetrics,
    pub second: QualityMetrics,
    pub winner: ComparisonWinner,
    pub score_difference: f64,
    /// `first − second` per dimension.
    pub dimension_deltas: BTreeMap<QualityDimension, f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern tables
// ─────────────────────────────────────────────────────────────────────────────

static ENTITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b[A-Z][a-z]+ [A-Z][a-z]+\b",                          // person-like bigrams
        r"\b[A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*\s+(?:Inc|Corp|LLC|Ltd)\b", // company suffixes
        r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b",                    // dates
        r"\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:AM|PM)?\b",            // times
        r"\b[A-Z]{2,}\b",                                        // acronyms
        r"\$\d+(?:,\d{3})*(?:\.\d{2})?\b",                       // currency
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid entity pattern"))
    .collect()
});

static SENTENCE_TERMINATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("invalid terminator pattern"));

struct FluencyPatterns {
    good: Vec<Regex>,
    bad: Vec<Regex>,
}

const CONTRADICTION_PAIRS: [(&str, &str); 5] = [
    ("yes", "no"),
    ("true", "false"),
    ("on", "off"),
    ("always", "never"),
    ("all", "none"),
];

fn default_fluency_patterns() -> HashMap<String, FluencyPatterns> {
    let build = |patterns: &[&str]| -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).expect("invalid fluency pattern"))
            .collect()
    };
    let mut table = HashMap::new();
    table.insert(
        "en".to_string(),
        FluencyPatterns {
            good: build(&[
                r"\b(?:the|a|an)\s+\w+",
                r"\b\w+\s+(?:is|are|was|were)\s+",
                r"\b\w+ly\b",
            ]),
            bad: build(&[r"\b\w+\s+\w+\s+\w+\s+of\s+\w+\s+of\b", r"\bof\s+the\s+of\b"]),
        },
    );
    table
}

fn default_length_bands() -> HashMap<(String, String), (f64, f64)> {
    let mut bands = HashMap::new();
    bands.insert(("en".into(), "ru".into()), (1.1, 1.4));
    bands.insert(("ru".into(), "en".into()), (0.7, 0.9));
    bands.insert(("en".into(), "es".into()), (1.0, 1.2));
    bands.insert(("es".into(), "en".into()), (0.8, 1.0));
    bands
}

const DEFAULT_LENGTH_BAND: (f64, f64) = (0.7, 1.4);

// ─────────────────────────────────────────────────────────────────────────────
// QualityEngine
// ─────────────────────────────────────────────────────────────────────────────

pub struct QualityEngine {
    quality_threshold: f64,
    embedder: Option<Arc<dyn Embedder>>,
    fluency_patterns: HashMap<String, FluencyPatterns>,
    length_bands: HashMap<(String, String), (f64, f64)>,
}

impl QualityEngine {
    pub fn new(quality_threshold: f64, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            quality_threshold,
            embedder,
            fluency_patterns: default_fluency_patterns(),
            length_bands: default_length_bands(),
        }
    }

    /// Assess a translation pair. Always returns a result.
    pub async fn assess(&self, pair: &TranslationPair) -> QualityMetrics {
        if pair.translation.trim().is_empty() {
            return self.empty_translation_metrics(pair);
        }

        let mut scores = BTreeMap::new();
        scores.insert(QualityDimension::Confidence, self.assess_confidence(pair));
        scores.insert(QualityDimension::LengthRatio, self.assess_length_ratio(pair));
        scores.insert(
            QualityDimension::StructureIntegrity,
            self.assess_structure_integrity(pair),
        );
        scores.insert(
            QualityDimension::NamedEntityPreservation,
            self.assess_entity_preservation(pair),
        );
        scores.insert(
            QualityDimension::BoundaryCoherence,
            self.assess_boundary_coherence(pair).await,
        );
        scores.insert(
            QualityDimension::SemanticSimilarity,
            self.assess_semantic_similarity(pair).await,
        );
        scores.insert(QualityDimension::Fluency, self.assess_fluency(pair));
        scores.insert(QualityDimension::Consistency, self.assess_consistency(pair));

        // Clamp every dimension into [0, 1] before aggregation.
        for value in scores.values_mut() {
            *value = value.clamp(0.0, 1.0);
        }

        let overall_score = weighted_overall(&scores);
        let confidence_interval = bracketing_interval(&scores, overall_score);
        let quality_grade = QualityGrade::from_score(overall_score);
        let optimization_needed = overall_score < self.quality_threshold;
        let improvement_suggestions = suggestions_for(&scores);

        let mut metadata = Metadata::new();
        metadata.insert("assessed_at".into(), Utc::now().to_rfc3339().into());
        if let Some((src, tgt)) = &pair.language_pair {
            metadata.insert("language_pair".into(), format!("{src}-{tgt}").into());
        }
        metadata.insert("original_length".into(), char_len(&pair.original).into());
        metadata.insert("translation_length".into(), char_len(&pair.translation).into());
        metadata.insert("chunked".into(), pair.chunks_original.is_some().into());

        QualityMetrics {
            overall_score,
            dimension_scores: scores,
            confidence_interval,
            quality_grade,
            optimization_needed,
            improvement_suggestions,
            metadata,
        }
    }

    /// Assess two candidate translations of the same original and pick a
    /// winner.
    pub async fn compare(
        &self,
        original: &str,
        first: &str,
        second: &str,
        language_pair: Option<(String, String)>,
    ) -> TranslationComparison {
        let mut pair_a = TranslationPair::new(original, first);
        pair_a.language_pair = language_pair.clone();
        let mut pair_b = TranslationPair::new(original, second);
        pair_b.language_pair = language_pair;

        let metrics_a = self.assess(&pair_a).await;
        let metrics_b = self.assess(&pair_b).await;

        let winner = if metrics_a.overall_score > metrics_b.overall_score {
            ComparisonWinner::First
        } else {
            ComparisonWinner::Second
        };
        let score_difference = (metrics_a.overall_score - metrics_b.overall_score).abs();
        let dimension_deltas = QualityDimension::ALL
            .iter()
            .map(|dim| {
                let a = metrics_a.dimension_scores.get(dim).copied().unwrap_or(0.0);
                let b = metrics_b.dimension_scores.get(dim).copied().unwrap_or(0.0);
                (*dim, a - b)
            })
            .collect();

        TranslationComparison {
            first: metrics_a,
            second: metrics_b,
            winner,
            score_difference,
            dimension_deltas,
        }
    }

    fn empty_translation_metrics(&self, pair: &TranslationPair) -> QualityMetrics {
        let scores: BTreeMap<QualityDimension, f64> =
            QualityDimension::ALL.iter().map(|d| (*d, 0.0)).collect();
        let mut metadata = Metadata::new();
        metadata.insert("error".into(), "empty translation".into());
        metadata.insert("original_length".into(), char_len(&pair.original).into());
        QualityMetrics {
            overall_score: 0.0,
            dimension_scores: scores,
            confidence_interval: (0.0, 0.0),
            quality_grade: QualityGrade::F,
            optimization_needed: true,
            improvement_suggestions: vec!["Translation is empty".to_string()],
            metadata,
        }
    }

    // ── Dimension scorers ───────────────────────────────────────────────────

    /// Model confidence when provided; length-ratio heuristic otherwise.
    fn assess_confidence(&self, pair: &TranslationPair) -> f64 {
        if let Some(confidence) = pair.model_confidence {
            return confidence.clamp(0.0, 1.0);
        }
        let original_len = char_len(&pair.original) as f64;
        let translation_len = char_len(&pair.translation) as f64;
        if original_len > 0.0
            && (translation_len < original_len * 0.3 || translation_len > original_len * 3.0)
        {
            return 0.4;
        }
        0.6
    }

    fn assess_length_ratio(&self, pair: &TranslationPair) -> f64 {
        let original_len = char_len(pair.original.trim()) as f64;
        let translation_len = char_len(pair.translation.trim()) as f64;
        if original_len == 0.0 {
            return 0.0;
        }
        let ratio = translation_len / original_len;

        let (expected_min, expected_max) = pair
            .language_pair
            .as_ref()
            .and_then(|(src, tgt)| self.length_bands.get(&(src.clone(), tgt.clone())))
            .copied()
            .unwrap_or(DEFAULT_LENGTH_BAND);

        if (expected_min..=expected_max).contains(&ratio) {
            1.0
        } else if ratio < expected_min * 0.5 || ratio > expected_max * 2.0 {
            0.2
        } else if ratio < expected_min {
            0.2 + 0.8 * (ratio / expected_min)
        } else {
            1.0 - 0.8 * ((ratio - expected_max) / expected_max)
        }
    }

    /// Mean of paragraph-count, sentence-count, and punctuation-count
    /// similarity sub-scores.
    fn assess_structure_integrity(&self, pair: &TranslationPair) -> f64 {
        let count_similarity = |a: usize, b: usize| -> f64 {
            (1.0 - (a as f64 - b as f64).abs() / (a.max(1)) as f64).clamp(0.0, 1.0)
        };

        let orig_paragraphs = pair.original.split("\n\n").count();
        let trans_paragraphs = pair.translation.split("\n\n").count();

        let orig_sentences = SENTENCE_TERMINATORS.find_iter(&pair.original).count();
        let trans_sentences = SENTENCE_TERMINATORS.find_iter(&pair.translation).count();

        let punctuation = |text: &str| text.chars().filter(|c| ",.;:!?()-".contains(*c)).count();
        let orig_punct = punctuation(&pair.original);
        let trans_punct = punctuation(&pair.translation);

        nlp::stats::mean(&[
            count_similarity(orig_paragraphs, trans_paragraphs),
            count_similarity(orig_sentences, trans_sentences),
            count_similarity(orig_punct, trans_punct),
        ])
    }

    /// Exact matches count 1.0, partial matches (any entity word longer than
    /// two characters present) count 0.5. No entities → perfect score.
    fn assess_entity_preservation(&self, pair: &TranslationPair) -> f64 {
        let mut entities: HashSet<String> = HashSet::new();
        for pattern in ENTITY_PATTERNS.iter() {
            for m in pattern.find_iter(&pair.original) {
                entities.insert(m.as_str().to_string());
            }
        }
        if entities.is_empty() {
            return 1.0;
        }

        let translation_lower = pair.translation.to_lowercase();
        let mut preserved = 0.0;
        for entity in &entities {
            if translation_lower.contains(&entity.to_lowercase()) {
                preserved += 1.0;
            } else if entity
                .split_whitespace()
                .filter(|w| w.chars().count() > 2)
                .any(|w| translation_lower.contains(&w.to_lowercase()))
            {
                preserved += 0.5;
            }
        }
        preserved / entities.len() as f64
    }

    /// Mean cosine similarity of adjacent translated chunks; 1.0 for fewer
    /// than two chunks, 0.7 when no embedder is available.
    async fn assess_boundary_coherence(&self, pair: &TranslationPair) -> f64 {
        let Some(chunks) = &pair.chunks_translated else {
            return 1.0;
        };
        if chunks.len() < 2 {
            return 1.0;
        }
        let Some(embedder) = &self.embedder else {
            return 0.7;
        };
        match embedder.embed(chunks).await {
            Ok(vectors) => mean_adjacent_similarity(&vectors).unwrap_or(0.7),
            Err(e) => {
                warn!("boundary coherence assessment failed: {e}");
                0.7
            }
        }
    }

    /// Cosine similarity of the full original and translation embeddings;
    /// 0.7 when no embedder is available.
    async fn assess_semantic_similarity(&self, pair: &TranslationPair) -> f64 {
        let Some(embedder) = &self.embedder else {
            return 0.7;
        };
        let texts = vec![pair.original.clone(), pair.translation.clone()];
        match embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == 2 => {
                (cosine_similarity(&vectors[0], &vectors[1]) as f64).max(0.0)
            }
            Ok(_) => 0.7,
            Err(e) => {
                warn!("semantic similarity assessment failed: {e}");
                0.7
            }
        }
    }

    fn assess_fluency(&self, pair: &TranslationPair) -> f64 {
        let target_lang = pair
            .language_pair
            .as_ref()
            .map(|(_, tgt)| tgt.as_str())
            .unwrap_or("en");

        let Some(patterns) = self.fluency_patterns.get(target_lang) else {
            return 0.7;
        };

        let word_count = pair.translation.split_whitespace().count();
        if word_count == 0 {
            return 0.0;
        }

        let good: usize = patterns
            .good
            .iter()
            .map(|p| p.find_iter(&pair.translation).count())
            .sum();
        let bad: usize = patterns
            .bad
            .iter()
            .map(|p| p.find_iter(&pair.translation).count())
            .sum();

        let good_ratio = good as f64 / word_count as f64;
        let bad_ratio = bad as f64 / word_count as f64;
        ((good_ratio * 2.0).min(1.0) - (bad_ratio * 5.0).min(0.5)).clamp(0.0, 1.0)
    }

    /// Penalize heavy word repetition, contradictory keywords, and erratic
    /// sentence lengths.
    fn assess_consistency(&self, pair: &TranslationPair) -> f64 {
        let translation_lower = pair.translation.to_lowercase();
        let words: Vec<&str> = translation_lower.split_whitespace().collect();
        let mut score: f64 = 1.0;

        if !words.is_empty() {
            let unique: HashSet<&str> = words.iter().copied().collect();
            let repetition_ratio = words.len() as f64 / unique.len() as f64;
            if repetition_ratio > 2.0 {
                score -= 0.2;
            }
        }

        for (first, second) in CONTRADICTION_PAIRS {
            if translation_lower.contains(first) && translation_lower.contains(second) {
                score -= 0.1;
            }
        }

        let sentence_lengths: Vec<f64> = pair
            .translation
            .split('.')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.split_whitespace().count() as f64)
            .collect();
        if sentence_lengths.len() > 1 {
            let mean = nlp::stats::mean(&sentence_lengths);
            let variance = sentence_lengths
                .iter()
                .map(|l| (l - mean).powi(2))
                .sum::<f64>()
                / sentence_lengths.len() as f64;
            if variance > mean * 0.5 {
                score -= 0.1;
            }
        }

        score.clamp(0.0, 1.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregation helpers
// ─────────────────────────────────────────────────────────────────────────────

fn weighted_overall(scores: &BTreeMap<QualityDimension, f64>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (dimension, score) in scores {
        weighted_sum += score * dimension.weight();
        total_weight += dimension.weight();
    }
    if total_weight == 0.0 {
        0.0
    } else {
        weighted_sum / total_weight
    }
}

/// 95% interval over the dimension sample, widened so it always brackets the
/// weighted overall score.
fn bracketing_interval(scores: &BTreeMap<QualityDimension, f64>, overall: f64) -> (f64, f64) {
    let values: Vec<f64> = scores.values().copied().collect();
    let (low, high) = nlp::stats::confidence_interval_95(&values);
    (low.min(overall), high.max(overall))
}

fn suggestions_for(scores: &BTreeMap<QualityDimension, f64>) -> Vec<String> {
    let mut suggestions = Vec::new();
    for (dimension, score) in scores {
        if *score < 0.6 {
            if let Some(text) = dimension.suggestion() {
                suggestions.push(text.to_string());
            }
        }
    }
    if suggestions.is_empty() {
        suggestions.push("Quality is acceptable - minor optimizations possible".to_string());
    }
    suggestions
}
