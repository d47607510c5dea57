//! Context-aware semantic chunker.
//!
//! Splits input into translation-sized chunks using a strategy selected by
//! content classification: sentence-greedy accumulation for emotional text,
//! paragraph-first splitting for technical text, pass-through for short
//! conversational text, and embedding-similarity grouping for formal and
//! narrative prose. Never fails on non-empty input; everything degrades.

pub mod discourse;

use crate::backend::Embedder;
use crate::core::config::AdaptiveConfig;
use crate::core::types::Metadata;
use crate::nlp::{char_len, cosine_similarity, mean_adjacent_similarity, split_paragraphs, split_sentences, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub use discourse::DiscourseFeatures;

/// Content classification governing the chunking strategy and size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Emotional,
    Technical,
    Conversational,
    Formal,
    Narrative,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emotional => "emotional",
            Self::Technical => "technical",
            Self::Conversational => "conversational",
            Self::Formal => "formal",
            Self::Narrative => "narrative",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contiguous span of the original text, translated independently.
/// `[start, end)` are byte offsets into the original input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        char_len(&self.text)
    }
}

/// Output of one chunking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingResult {
    pub chunks: Vec<Chunk>,
    pub content_type: ContentType,
    /// Mean adjacent-chunk cosine similarity; 1.0 for a single chunk,
    /// 0.5 when no embedder is available.
    pub coherence_score: f64,
    /// Estimated best chunk size (characters) for this content.
    pub optimal_size_estimate: usize,
    pub features: DiscourseFeatures,
    pub metadata: Metadata,
}

impl ChunkingResult {
    /// Chunk texts in order, for translation fan-out.
    pub fn chunk_texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }

    fn empty() -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("error".into(), "empty input text".into());
        Self {
            chunks: Vec::new(),
            content_type: ContentType::Conversational,
            coherence_score: 0.0,
            optimal_size_estimate: 0,
            features: DiscourseFeatures::default(),
            metadata,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SemanticChunker
// ─────────────────────────────────────────────────────────────────────────────

pub struct SemanticChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
    similarity_threshold: f32,
    embedder: Option<Arc<dyn Embedder>>,
}

impl SemanticChunker {
    pub fn new(
        min_chunk_size: usize,
        max_chunk_size: usize,
        similarity_threshold: f32,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            min_chunk_size,
            max_chunk_size,
            similarity_threshold,
            embedder,
        }
    }

    pub fn from_config(config: &AdaptiveConfig, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self::new(
            config.min_chunk_size,
            config.max_chunk_size,
            config.chunker_similarity_threshold,
            embedder,
        )
    }

    /// Chunk `text` for translation from `source_lang` to `target_lang`.
    ///
    /// Empty input yields an empty conversational result with zero coherence;
    /// everything else succeeds, degrading to size-greedy accumulation when
    /// no embedder is configured.
    pub async fn chunk(&self, text: &str, source_lang: &str, _target_lang: &str) -> ChunkingResult {
        if text.trim().is_empty() {
            return ChunkingResult::empty();
        }

        let lang = discourse::resolve_language(source_lang, text);
        let sentences = split_sentences(text);
        let features = discourse::analyze(text, &sentences, &lang);
        let content_type = discourse::classify(text, &features);

        let chunks = match content_type {
            ContentType::Emotional => self.chunk_sentence_greedy(&sentences),
            ContentType::Technical => self.chunk_technical(text),
            ContentType::Conversational => self.chunk_conversational(text, &sentences).await,
            ContentType::Formal | ContentType::Narrative => {
                self.chunk_by_similarity(&sentences).await
            }
        };

        let coherence_score = self.coherence_score(&chunks).await;
        let optimal_size_estimate = self.estimate_optimal_size(content_type, &features);

        debug!(
            "chunked {} chars into {} {} chunk(s), coherence {:.2}",
            char_len(text),
            chunks.len(),
            content_type,
            coherence_score
        );

        let mut metadata = Metadata::new();
        metadata.insert("total_length".into(), char_len(text).into());
        metadata.insert("num_chunks".into(), chunks.len().into());
        let avg_chunk = if chunks.is_empty() {
            0
        } else {
            chunks.iter().map(Chunk::char_len).sum::<usize>() / chunks.len()
        };
        metadata.insert("avg_chunk_size".into(), avg_chunk.into());
        if source_lang == "auto" {
            metadata.insert("detected_language".into(), lang.clone().into());
        }

        ChunkingResult {
            chunks,
            content_type,
            coherence_score,
            optimal_size_estimate,
            features,
            metadata,
        }
    }

    // ── Strategies ───────────────────────────────────────────────────────────

    /// Accumulate whole sentences until the next one would overflow
    /// `max_chunk_size`. Never splits inside a sentence.
    fn chunk_sentence_greedy(&self, sentences: &[Span]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<&Span> = Vec::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            let added = sentence.char_len() + if current.is_empty() { 0 } else { 1 };
            if current_len + added > self.max_chunk_size && !current.is_empty() {
                chunks.push(join_spans(&current, " "));
                current.clear();
                current_len = 0;
            }
            current_len += sentence.char_len() + if current.is_empty() { 0 } else { 1 };
            current.push(sentence);
        }
        if !current.is_empty() {
            chunks.push(join_spans(&current, " "));
        }
        chunks
    }

    /// Paragraph-first splitting; oversized paragraphs are sub-split
    /// sentence-greedy.
    fn chunk_technical(&self, text: &str) -> Vec<Chunk> {
        let paragraphs = split_paragraphs(text);
        let mut chunks = Vec::new();
        let mut current: Vec<&Span> = Vec::new();
        let mut current_len = 0usize;

        for paragraph in &paragraphs {
            let para_len = paragraph.char_len();
            if para_len > self.max_chunk_size {
                if !current.is_empty() {
                    chunks.push(join_spans(&current, "\n\n"));
                    current.clear();
                    current_len = 0;
                }
                // Sentence offsets are paragraph-relative; shift them back.
                let sentences: Vec<Span> = split_sentences(&paragraph.text)
                    .into_iter()
                    .map(|s| Span {
                        start: s.start + paragraph.start,
                        end: s.end + paragraph.start,
                        text: s.text,
                    })
                    .collect();
                chunks.extend(self.chunk_sentence_greedy(&sentences));
                continue;
            }

            let added = para_len + if current.is_empty() { 0 } else { 2 };
            if current_len + added > self.max_chunk_size && !current.is_empty() {
                chunks.push(join_spans(&current, "\n\n"));
                current.clear();
                current_len = 0;
            }
            current_len += para_len + if current.is_empty() { 0 } else { 2 };
            current.push(paragraph);
        }
        if !current.is_empty() {
            chunks.push(join_spans(&current, "\n\n"));
        }
        chunks
    }

    /// Short conversational text passes through whole; anything larger falls
    /// back to similarity grouping.
    async fn chunk_conversational(&self, text: &str, sentences: &[Span]) -> Vec<Chunk> {
        if char_len(text) <= self.max_chunk_size {
            return vec![Chunk {
                text: text.to_string(),
                start: 0,
                end: text.len(),
            }];
        }
        self.chunk_by_similarity(sentences).await
    }

    /// Group sentences by embedding similarity; size-greedy when no embedder
    /// is available or the text is too short to matter.
    async fn chunk_by_similarity(&self, sentences: &[Span]) -> Vec<Chunk> {
        let Some(embedder) = &self.embedder else {
            return self.chunk_sentence_greedy(sentences);
        };
        if sentences.len() <= 2 {
            return self.chunk_sentence_greedy(sentences);
        }

        let texts: Vec<String> = sentences.iter().map(|s| s.text.clone()).collect();
        let embeddings = match embedder.embed(&texts).await {
            Ok(vectors) if vectors.len() == sentences.len() => vectors,
            Ok(_) => {
                warn!("embedder returned a short batch; falling back to size-based chunking");
                return self.chunk_sentence_greedy(sentences);
            }
            Err(e) => {
                warn!("similarity chunking failed: {e}; falling back to size-based chunking");
                return self.chunk_sentence_greedy(sentences);
            }
        };

        // Greedy grouping: seed each group at the first unassigned sentence,
        // then pull in later sentences that are similar enough and still fit.
        let mut used = vec![false; sentences.len()];
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in 0..sentences.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let mut group = vec![i];
            let mut group_len = sentences[i].char_len();
            for j in (i + 1)..sentences.len() {
                if used[j] {
                    continue;
                }
                let similar = cosine_similarity(&embeddings[i], &embeddings[j])
                    > self.similarity_threshold;
                if similar && group_len + sentences[j].char_len() < self.max_chunk_size {
                    used[j] = true;
                    group_len += sentences[j].char_len();
                    group.push(j);
                }
            }
            groups.push(group);
        }

        // Group members may be non-contiguous, so chunk boundaries here are
        // synthetic running offsets rather than source spans.
        let mut chunks = Vec::new();
        let mut position = 0usize;
        for group in groups {
            let text = group
                .iter()
                .map(|&idx| sentences[idx].text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let len = char_len(&text);
            chunks.push(Chunk {
                text,
                start: position,
                end: position + len,
            });
            position += len + 1;
        }
        chunks
    }

    // ── Scoring ──────────────────────────────────────────────────────────────

    async fn coherence_score(&self, chunks: &[Chunk]) -> f64 {
        if chunks.len() == 1 {
            return 1.0;
        }
        let Some(embedder) = &self.embedder else {
            return 0.5;
        };
        if chunks.is_empty() {
            return 0.5;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        match embedder.embed(&texts).await {
            Ok(vectors) => mean_adjacent_similarity(&vectors).unwrap_or(0.5),
            Err(e) => {
                warn!("coherence scoring failed: {e}");
                0.5
            }
        }
    }

    /// Content-aware chunk size estimate, clamped to the configured bounds.
    fn estimate_optimal_size(&self, content_type: ContentType, features: &DiscourseFeatures) -> usize {
        let mut size: i64 = match content_type {
            ContentType::Emotional => 400,
            ContentType::Technical => 250,
            ContentType::Conversational => 200,
            ContentType::Formal | ContentType::Narrative => 300,
        };
        if features.avg_sentence_length > 30.0 {
            size += 100;
        } else if features.avg_sentence_length < 10.0 {
            size -= 50;
        }
        (size.max(0) as usize).clamp(self.min_chunk_size, self.max_chunk_size)
    }
}

/// Merge consecutive source spans into one chunk covering them.
fn join_spans(spans: &[&Span], separator: &str) -> Chunk {
    let text = spans
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(separator);
    Chunk {
        text,
        start: spans.first().map(|s| s.start).unwrap_or(0),
        end: spans.last().map(|s| s.end).unwrap_or(0),
    }
}
