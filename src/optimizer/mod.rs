//! Binary-search chunk-size optimizer.
//!
//! Samples the quality curve at strategy-specific candidate chunk sizes
//! (parallel probes under the evaluation bound), identifies the most
//! promising region, and fine-tunes inside it with a handful of midpoint
//! probes. Honors its deadline by racing each phase against a timer and
//! degrades to a failed result carrying the baseline instead of erroring.
//! Individual probe failures are logged and dropped; the run can still
//! succeed on the surviving probes.

use crate::backend::{BoundedTranslator, Embedder};
use crate::chunker::{ChunkingResult, SemanticChunker};
use crate::core::config::AdaptiveConfig;
use crate::core::types::Metadata;
use crate::nlp::stats;
use crate::quality::{QualityEngine, TranslationPair};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Search effort profile. Chooses how many points of the quality curve get
/// sampled before fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    QualityFocused,
    Balanced,
    SpeedFocused,
}

impl OptimizationStrategy {
    fn sample_sizes(self) -> &'static [usize] {
        match self {
            Self::QualityFocused => &[150, 250, 350, 450, 550, 650],
            Self::Balanced => &[150, 300, 450, 600],
            Self::SpeedFocused => &[200, 400, 600],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualityFocused => "quality_focused",
            Self::Balanced => "balanced",
            Self::SpeedFocused => "speed_focused",
        }
    }
}

/// One probe of the quality curve.
#[derive(Debug, Clone)]
pub struct OptimizationPoint {
    pub chunk_size: usize,
    pub quality_score: f64,
    pub translation: String,
    pub chunking_result: ChunkingResult,
    pub processing_time_ms: u64,
    /// Narrowness of the probe's quality confidence interval, in `[0, 1]`.
    pub confidence: f64,
}

/// Outcome of one optimizer run. `quality_improvement` may be negative when
/// the search failed to beat the baseline; the controller discards such
/// results.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub optimal_chunk_size: usize,
    pub optimal_translation: String,
    pub optimal_quality_score: f64,
    pub quality_improvement: f64,
    pub confidence_interval: (f64, f64),
    pub optimization_confidence: f64,
    pub search_points: Vec<OptimizationPoint>,
    pub convergence_iterations: usize,
    pub total_optimization_time_ms: u64,
    pub metadata: Metadata,
}

impl OptimizationResult {
    /// Whether this run degraded to the baseline-carrying failure shape.
    pub fn failed(&self) -> bool {
        self.metadata
            .get("optimization_failed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Chunking produced by the winning probe, when one exists.
    pub fn optimal_chunking(&self) -> Option<&ChunkingResult> {
        self.search_points
            .iter()
            .find(|p| p.chunk_size == self.optimal_chunk_size)
            .map(|p| &p.chunking_result)
    }
}

/// Running optimizer performance counters.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStatistics {
    pub total_optimizations: u64,
    pub successful_optimizations: u64,
    pub success_rate: f64,
    pub avg_improvement: f64,
    pub avg_optimization_time_ms: f64,
    pub convergence_threshold: f64,
    pub chunk_size_range: (usize, usize),
}

#[derive(Default)]
struct RunningStats {
    total: u64,
    successful: u64,
    avg_improvement: f64,
    avg_time_ms: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// BinarySearchOptimizer
// ─────────────────────────────────────────────────────────────────────────────

pub struct BinarySearchOptimizer {
    translator: BoundedTranslator,
    embedder: Option<Arc<dyn Embedder>>,
    quality: Arc<QualityEngine>,
    config: AdaptiveConfig,
    stats: Mutex<RunningStats>,
}

impl BinarySearchOptimizer {
    pub fn new(
        translator: BoundedTranslator,
        embedder: Option<Arc<dyn Embedder>>,
        quality: Arc<QualityEngine>,
        config: AdaptiveConfig,
    ) -> Self {
        Self {
            translator,
            embedder,
            quality,
            config,
            stats: Mutex::new(RunningStats::default()),
        }
    }

    /// Search for a chunk size whose translation quality beats the baseline.
    ///
    /// Phase 1 samples the curve under `0.6 × deadline`; phase 3 fine-tunes
    /// within whatever budget remains. Deadline expiry or a dry sample set
    /// yields a failed result carrying the baseline, never an error.
    pub async fn optimize(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        baseline_translation: &str,
        baseline_score: f64,
        strategy: OptimizationStrategy,
        deadline: Duration,
    ) -> OptimizationResult {
        let started = Instant::now();
        {
            let mut stats = self.stats.lock().await;
            stats.total += 1;
        }

        // ── Phase 1: sample the quality curve ────────────────────────────
        let phase1_budget = deadline.mul_f64(0.6);
        let samples = match tokio::time::timeout(
            phase1_budget,
            self.sample_quality_curve(text, source_lang, target_lang, strategy),
        )
        .await
        {
            Ok(points) => points,
            Err(_) => {
                warn!(
                    "optimizer phase 1 exceeded {}ms; returning baseline",
                    phase1_budget.as_millis()
                );
                return self
                    .failed_result(baseline_translation, baseline_score, started, strategy, true)
                    .await;
            }
        };

        if samples.len() < 2 {
            debug!("optimizer: {} usable sample(s), cannot identify a region", samples.len());
            return self
                .failed_result(baseline_translation, baseline_score, started, strategy, false)
                .await;
        }

        // ── Phase 2: identify the promising region ───────────────────────
        let region = self.identify_region(&samples, baseline_score);

        // ── Phase 3: fine-tune within the region ─────────────────────────
        let remaining = deadline.saturating_sub(started.elapsed());
        let mut all_points = samples.clone();
        let best = if remaining > Duration::from_secs(1) {
            match tokio::time::timeout(
                remaining,
                self.fine_tune(text, source_lang, target_lang, region, &samples, &mut all_points),
            )
            .await
            {
                Ok(point) => point,
                Err(_) => best_of(&samples).clone(),
            }
        } else {
            best_of(&samples).clone()
        };

        // ── Wrap up ──────────────────────────────────────────────────────
        let scores: Vec<f64> = samples.iter().map(|p| p.quality_score).collect();
        let optimization_confidence = optimization_confidence(&scores, best.quality_score);
        let confidence_interval = search_confidence_interval(&scores);
        let quality_improvement = best.quality_score - baseline_score;
        let total_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock().await;
            if quality_improvement > self.config.convergence_threshold {
                stats.successful += 1;
                stats.avg_improvement = (stats.avg_improvement + quality_improvement) / 2.0;
            }
            stats.avg_time_ms = (stats.avg_time_ms + total_ms as f64) / 2.0;
        }

        info!(
            "optimizer: best chunk size {} scored {:.3} ({:+.3} vs baseline) over {} probes in {}ms",
            best.chunk_size,
            best.quality_score,
            quality_improvement,
            all_points.len(),
            total_ms
        );

        let mut metadata = Metadata::new();
        metadata.insert("strategy".into(), strategy.as_str().into());
        metadata.insert("baseline_quality".into(), baseline_score.into());
        metadata.insert("region".into(), serde_json::json!([region.0, region.1]));
        metadata.insert(
            "timeout_reached".into(),
            (started.elapsed() >= deadline.mul_f64(0.9)).into(),
        );

        let convergence_iterations = all_points.len();
        OptimizationResult {
            optimal_chunk_size: best.chunk_size,
            optimal_translation: best.translation.clone(),
            optimal_quality_score: best.quality_score,
            quality_improvement,
            confidence_interval,
            optimization_confidence,
            search_points: all_points,
            convergence_iterations,
            total_optimization_time_ms: total_ms,
            metadata,
        }
    }

    /// Performance counters for this optimizer instance.
    pub async fn stats(&self) -> OptimizerStatistics {
        let stats = self.stats.lock().await;
        OptimizerStatistics {
            total_optimizations: stats.total,
            successful_optimizations: stats.successful,
            success_rate: if stats.total > 0 {
                stats.successful as f64 / stats.total as f64
            } else {
                0.0
            },
            avg_improvement: stats.avg_improvement,
            avg_optimization_time_ms: stats.avg_time_ms,
            convergence_threshold: self.config.convergence_threshold,
            chunk_size_range: (self.config.min_chunk_size, self.config.max_chunk_size),
        }
    }

    // ── Phase 1 ──────────────────────────────────────────────────────────────

    async fn sample_quality_curve(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        strategy: OptimizationStrategy,
    ) -> Vec<OptimizationPoint> {
        let sizes: Vec<usize> = strategy
            .sample_sizes()
            .iter()
            .copied()
            .filter(|s| (self.config.min_chunk_size..=self.config.max_chunk_size).contains(s))
            .collect();
        debug!("optimizer sampling {} candidate sizes: {sizes:?}", sizes.len());

        let results: Vec<anyhow::Result<OptimizationPoint>> = stream::iter(sizes)
            .map(|size| self.evaluate_chunk_size(text, source_lang, target_lang, size))
            .buffered(self.config.optimizer_parallel_evaluations.max(1))
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("probe evaluation failed: {e}");
                    None
                }
            })
            .collect()
    }

    /// One probe: chunk with a size-pinned chunker, translate, score.
    async fn evaluate_chunk_size(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        chunk_size: usize,
    ) -> anyhow::Result<OptimizationPoint> {
        let probe_started = Instant::now();

        let probe_chunker = SemanticChunker::new(
            chunk_size.saturating_sub(50).max(self.config.min_chunk_size),
            chunk_size,
            self.config.chunker_similarity_threshold,
            self.embedder.clone(),
        );
        let chunking_result = probe_chunker.chunk(text, source_lang, target_lang).await;

        let chunk_texts = chunking_result.chunk_texts();
        let translated_chunks: Vec<String> = if chunk_texts.len() == 1 {
            vec![
                self.translator
                    .translate(&chunk_texts[0], source_lang, target_lang)
                    .await?,
            ]
        } else {
            let futures = chunk_texts
                .iter()
                .map(|chunk| self.translator.translate(chunk, source_lang, target_lang));
            futures::future::try_join_all(futures).await?
        };
        let translation = translated_chunks.join(" ");

        let pair = TranslationPair::new(text, translation.clone())
            .with_chunks(chunk_texts, translated_chunks)
            .with_language_pair(source_lang, target_lang);
        let metrics = self.quality.assess(&pair).await;

        Ok(OptimizationPoint {
            chunk_size,
            quality_score: metrics.overall_score,
            translation,
            chunking_result,
            processing_time_ms: probe_started.elapsed().as_millis() as u64,
            confidence: 1.0
                - (metrics.confidence_interval.1 - metrics.confidence_interval.0).abs(),
        })
    }

    // ── Phase 2 ──────────────────────────────────────────────────────────────

    /// `[min_improving − 50, max_improving + 50]` when any probe beats the
    /// baseline; a ±100 window around the best probe otherwise. Clamped to
    /// the configured bounds.
    fn identify_region(
        &self,
        samples: &[OptimizationPoint],
        baseline_score: f64,
    ) -> (usize, usize) {
        let improving: Vec<&OptimizationPoint> = samples
            .iter()
            .filter(|p| p.quality_score > baseline_score)
            .collect();

        let (low, high, margin) = if improving.is_empty() {
            let best = best_of(samples);
            (best.chunk_size, best.chunk_size, 100)
        } else {
            let min = improving.iter().map(|p| p.chunk_size).min().unwrap_or(0);
            let max = improving.iter().map(|p| p.chunk_size).max().unwrap_or(0);
            (min, max, 50)
        };

        (
            low.saturating_sub(margin).max(self.config.min_chunk_size),
            (high + margin).min(self.config.max_chunk_size),
        )
    }

    // ── Phase 3 ──────────────────────────────────────────────────────────────

    /// Up to three midpoint probes inside the region. An existing sample in
    /// the region short-circuits the search instead of re-paying for a
    /// translation that was already scored.
    async fn fine_tune(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        region: (usize, usize),
        samples: &[OptimizationPoint],
        all_points: &mut Vec<OptimizationPoint>,
    ) -> OptimizationPoint {
        let (region_start, region_end) = region;

        let in_region: Vec<&OptimizationPoint> = samples
            .iter()
            .filter(|p| (region_start..=region_end).contains(&p.chunk_size))
            .collect();
        if let Some(best) = in_region
            .iter()
            .max_by(|a, b| a.quality_score.total_cmp(&b.quality_score))
        {
            return (*best).clone();
        }

        let mut left = region_start;
        let mut right = region_end;
        let mut best: Option<OptimizationPoint> = None;
        let iterations = self.config.max_optimizer_iterations.min(3);

        for iteration in 0..iterations {
            if right.saturating_sub(left) < 50 {
                break;
            }
            let mid = (left + right) / 2;

            match self
                .evaluate_chunk_size(text, source_lang, target_lang, mid)
                .await
            {
                Ok(point) => {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| point.quality_score > b.quality_score);
                    if better {
                        best = Some(point.clone());
                    }

                    if point.quality_score > 0.8 {
                        // Strong probe: narrow the window around it.
                        let margin = (right - left) / 4;
                        left = left.max(mid.saturating_sub(margin));
                        right = right.min(mid + margin);
                    } else if iteration % 2 == 0 {
                        left = mid;
                    } else {
                        right = mid;
                    }
                    all_points.push(point);
                }
                Err(e) => {
                    warn!("fine-tune iteration {iteration} failed: {e}");
                    break;
                }
            }
        }

        best.unwrap_or_else(|| best_of(samples).clone())
    }

    // ── Failure shape ────────────────────────────────────────────────────────

    async fn failed_result(
        &self,
        baseline_translation: &str,
        baseline_score: f64,
        started: Instant,
        strategy: OptimizationStrategy,
        deadline_exceeded: bool,
    ) -> OptimizationResult {
        let total_ms = started.elapsed().as_millis() as u64;
        {
            let mut stats = self.stats.lock().await;
            stats.avg_time_ms = (stats.avg_time_ms + total_ms as f64) / 2.0;
        }

        let mut metadata = Metadata::new();
        metadata.insert("optimization_failed".into(), true.into());
        metadata.insert("strategy".into(), strategy.as_str().into());
        metadata.insert("deadline_exceeded".into(), deadline_exceeded.into());

        OptimizationResult {
            optimal_chunk_size: 300usize
                .clamp(self.config.min_chunk_size, self.config.max_chunk_size),
            optimal_translation: baseline_translation.to_string(),
            optimal_quality_score: baseline_score,
            quality_improvement: 0.0,
            confidence_interval: (0.0, 1.0),
            optimization_confidence: 0.0,
            search_points: Vec::new(),
            convergence_iterations: 0,
            total_optimization_time_ms: total_ms,
            metadata,
        }
    }
}

/// Highest-scoring point. Callers guarantee a non-empty slice.
fn best_of(points: &[OptimizationPoint]) -> &OptimizationPoint {
    points
        .iter()
        .max_by(|a, b| a.quality_score.total_cmp(&b.quality_score))
        .expect("best_of called on empty probe set")
}

/// Diversity · 0.3 + consistency · 0.4 + optimum clarity · 0.3, in `[0, 1]`.
fn optimization_confidence(scores: &[f64], best_score: f64) -> f64 {
    if scores.len() < 2 {
        return 0.5;
    }
    let diversity = (scores.len() as f64 / 5.0).min(1.0);
    let consistency = (1.0 - stats::variance(scores) * 4.0).max(0.0);
    let mean = stats::mean(scores);
    let clarity = if mean > 0.0 {
        ((best_score - mean) / mean * 2.0).min(1.0)
    } else {
        0.5
    };
    (diversity * 0.3 + consistency * 0.4 + clarity * 0.3).clamp(0.0, 1.0)
}

/// 95% interval over sampled scores; a flat ±0.1 margin for tiny samples.
fn search_confidence_interval(scores: &[f64]) -> (f64, f64) {
    if scores.len() < 2 {
        return (0.0, 1.0);
    }
    let mean = stats::mean(scores);
    let margin = if scores.len() > 2 {
        1.96 * stats::std_dev(scores) / (scores.len() as f64).sqrt()
    } else {
        0.1
    };
    ((mean - margin).max(0.0), (mean + margin).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Translator;
    use anyhow::{bail, Result};
    use async_trait::async_trait;

    fn point(chunk_size: usize, quality_score: f64) -> OptimizationPoint {
        OptimizationPoint {
            chunk_size,
            quality_score,
            translation: format!("t{chunk_size}"),
            chunking_result: empty_chunking(),
            processing_time_ms: 1,
            confidence: 0.9,
        }
    }

    fn empty_chunking() -> ChunkingResult {
        ChunkingResult {
            chunks: Vec::new(),
            content_type: crate::chunker::ContentType::Formal,
            coherence_score: 0.5,
            optimal_size_estimate: 300,
            features: Default::default(),
            metadata: Default::default(),
        }
    }

    fn optimizer_with(translator: Arc<dyn Translator>) -> BinarySearchOptimizer {
        let config = AdaptiveConfig::default();
        let bounded = BoundedTranslator::new(translator, config.max_concurrent_translations);
        let quality = Arc::new(QualityEngine::new(config.quality_threshold, None));
        BinarySearchOptimizer::new(bounded, None, quality, config)
    }

    /// Good translation only for the full input; garbage for partial chunks.
    /// Large chunk sizes (one chunk) therefore outscore small ones.
    struct FullTextTranslator {
        full: String,
        good: String,
    }

    #[async_trait]
    impl Translator for FullTextTranslator {
        async fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
            if text == self.full {
                Ok(self.good.clone())
            } else {
                Ok("zz zz zz zz zz zz zz zz zz zz zz zz".to_string())
            }
        }
    }

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str, _src: &str, _tgt: &str) -> Result<String> {
            bail!("backend offline")
        }
    }

    struct SlowTranslator;

    #[async_trait]
    impl Translator for SlowTranslator {
        async fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(text.to_string())
        }
    }

    fn sample_text() -> String {
        "The committee reviewed the annual report in detail during the morning session. \
         Each department presented its findings and answered questions from the board. \
         The discussion covered budget allocations for the upcoming fiscal year as well. \
         Final decisions were postponed until the auditors deliver their assessment."
            .to_string()
    }

    #[test]
    fn improving_region_spans_improving_points_with_margin() {
        let optimizer = optimizer_with(Arc::new(FailingTranslator));
        let samples = vec![
            point(150, 0.60),
            point(300, 0.78),
            point(450, 0.83),
            point(600, 0.71),
        ];
        let region = optimizer.identify_region(&samples, 0.70);
        // Improving sizes are 300, 450, and 600 → [250, 650] clamped to 600.
        assert_eq!(region, (250, 600));

        // With a higher baseline only 450 improves → [400, 500].
        assert_eq!(optimizer.identify_region(&samples, 0.80), (400, 500));
    }

    #[test]
    fn no_improvement_gives_window_around_best() {
        let optimizer = optimizer_with(Arc::new(FailingTranslator));
        let samples = vec![point(200, 0.50), point(400, 0.55), point(600, 0.52)];
        let region = optimizer.identify_region(&samples, 0.90);
        assert_eq!(region, (300, 500));
    }

    #[test]
    fn confidence_rises_with_sample_count() {
        let few = optimization_confidence(&[0.7, 0.72], 0.72);
        let many = optimization_confidence(&[0.7, 0.71, 0.72, 0.73, 0.74], 0.74);
        assert!(many > few);
    }

    #[test]
    fn search_interval_is_clamped() {
        let (low, high) = search_confidence_interval(&[0.1, 0.9, 0.5, 0.7]);
        assert!(low >= 0.0 && high <= 1.0 && low <= high);
    }

    #[tokio::test]
    async fn optimizer_finds_an_improving_chunk_size() {
        let text = sample_text();
        let good = "Le comite a examine le rapport annuel en detail pendant la session du matin. \
                    Chaque departement a presente ses conclusions et repondu aux questions du conseil. \
                    La discussion a couvert les allocations budgetaires pour le prochain exercice. \
                    Les decisions finales ont ete reportees en attendant l'evaluation des auditeurs.";
        let optimizer = optimizer_with(Arc::new(FullTextTranslator {
            full: text.clone(),
            good: good.to_string(),
        }));

        let result = optimizer
            .optimize(
                &text,
                "en",
                "fr",
                "mediocre baseline output",
                0.55,
                OptimizationStrategy::Balanced,
                Duration::from_secs(30),
            )
            .await;

        assert!(!result.failed());
        assert!(result.quality_improvement > 0.0);
        // The winner must dominate every sampled probe.
        let max_sampled = result
            .search_points
            .iter()
            .map(|p| p.quality_score)
            .fold(f64::MIN, f64::max);
        assert!(result.optimal_quality_score >= max_sampled - 1e-9);
        // Only a single-chunk evaluation sees the full text, so the winning
        // size must be one that covered the whole input.
        assert!(result.optimal_chunk_size >= 300);
        let stats = optimizer.stats().await;
        assert_eq!(stats.total_optimizations, 1);
        assert_eq!(stats.successful_optimizations, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn all_probes_failing_degrades_to_baseline() {
        let optimizer = optimizer_with(Arc::new(FailingTranslator));
        let result = optimizer
            .optimize(
                &sample_text(),
                "en",
                "fr",
                "the baseline translation",
                0.70,
                OptimizationStrategy::SpeedFocused,
                Duration::from_secs(5),
            )
            .await;

        assert!(result.failed());
        assert_eq!(result.optimal_translation, "the baseline translation");
        assert_eq!(result.optimal_quality_score, 0.70);
        assert_eq!(result.quality_improvement, 0.0);
        assert_eq!(result.optimization_confidence, 0.0);
        assert!(result.search_points.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_degrades_to_baseline() {
        let optimizer = optimizer_with(Arc::new(SlowTranslator));
        let result = optimizer
            .optimize(
                &sample_text(),
                "en",
                "fr",
                "the baseline translation",
                0.70,
                OptimizationStrategy::Balanced,
                Duration::from_millis(50),
            )
            .await;

        assert!(result.failed());
        assert_eq!(
            result.metadata.get("deadline_exceeded").and_then(|v| v.as_bool()),
            Some(true)
        );
        assert_eq!(result.optimal_translation, "the baseline translation");
    }
}
