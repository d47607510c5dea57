//! Adaptive translation controller.
//!
//! Orchestrates one request through the pipeline: cache lookup → semantic
//! chunk + translate → quality scoring → decision gate → optional
//! binary-search optimization → cache write. The progressive variant emits
//! staged updates through a caller-supplied sink; sink failures are logged
//! and never abort the pipeline.

use crate::backend::{BoundedTranslator, Embedder, KvStore, Translator};
use crate::cache::{
    CacheEntry, CacheStatistics, CacheWriteRequest, OptimizationLevel, TranslationCache,
};
use crate::chunker::{ContentType, SemanticChunker};
use crate::core::config::AdaptiveConfig;
use crate::core::error::{CoreError, CoreResult};
use crate::core::types::{
    Metadata, TranslationPreference, TranslationRequest, TranslationResult, TranslationStage,
    TranslationUpdate,
};
use crate::optimizer::{BinarySearchOptimizer, OptimizationStrategy, OptimizerStatistics};
use crate::quality::{QualityEngine, QualityMetrics, TranslationPair};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Score below which a `Quality`-preference request triggers optimization.
const QUALITY_PREFERENCE_THRESHOLD: f64 = 0.85;
/// Score below which a `Balanced`-preference request triggers optimization.
const BALANCED_PREFERENCE_THRESHOLD: f64 = 0.80;

// ─────────────────────────────────────────────────────────────────────────────
// Progress sink
// ─────────────────────────────────────────────────────────────────────────────

/// Consumer of progressive updates. Implementations must tolerate being
/// called from the request task; a failing sink is logged and ignored.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, update: TranslationUpdate) -> anyhow::Result<()>;
}

#[async_trait]
impl ProgressSink for tokio::sync::mpsc::Sender<TranslationUpdate> {
    async fn emit(&self, update: TranslationUpdate) -> anyhow::Result<()> {
        self.send(update)
            .await
            .map_err(|_| anyhow::anyhow!("progress channel closed"))
    }
}

async fn safe_emit(sink: &dyn ProgressSink, update: TranslationUpdate) {
    if let Err(e) = sink.emit(update).await {
        warn!("progress sink failed (ignored): {e}");
    }
}

/// Controller performance counters.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatistics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub optimizations_triggered: u64,
    pub avg_processing_time_ms: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// AdaptiveController
// ─────────────────────────────────────────────────────────────────────────────

pub struct AdaptiveController {
    config: AdaptiveConfig,
    translator: BoundedTranslator,
    chunker: SemanticChunker,
    quality: Arc<QualityEngine>,
    cache: Arc<TranslationCache>,
    optimizer: BinarySearchOptimizer,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    optimizations_triggered: AtomicU64,
    avg_processing_ms: Mutex<f64>,
}

impl AdaptiveController {
    /// Wire up the pipeline. The embedder and KV store are optional; every
    /// component degrades without them.
    pub fn new(
        config: AdaptiveConfig,
        translator: Arc<dyn Translator>,
        embedder: Option<Arc<dyn Embedder>>,
        kv: Option<Arc<dyn KvStore>>,
    ) -> Self {
        let translator = BoundedTranslator::new(translator, config.max_concurrent_translations);
        let chunker = SemanticChunker::from_config(&config, embedder.clone());
        let quality = Arc::new(QualityEngine::new(config.quality_threshold, embedder.clone()));
        let cache = Arc::new(TranslationCache::new(&config, kv, embedder.clone()));
        let optimizer = BinarySearchOptimizer::new(
            translator.clone(),
            embedder,
            Arc::clone(&quality),
            config.clone(),
        );
        Self {
            config,
            translator,
            chunker,
            quality,
            cache,
            optimizer,
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            optimizations_triggered: AtomicU64::new(0),
            avg_processing_ms: Mutex::new(0.0),
        }
    }

    /// Translate one request.
    pub async fn translate(&self, request: TranslationRequest) -> CoreResult<TranslationResult> {
        self.run(request, None).await
    }

    /// Translate with staged progress updates. Update order per request:
    /// starting → post-semantic → analyzing → (optimizing → optimized) →
    /// final; a terminal `Error` update precedes any error return.
    pub async fn progressive_translate(
        &self,
        request: TranslationRequest,
        sink: &dyn ProgressSink,
    ) -> CoreResult<TranslationResult> {
        self.run(request, Some(sink)).await
    }

    pub async fn cache_stats(&self) -> CacheStatistics {
        self.cache.stats().await
    }

    pub async fn optimizer_stats(&self) -> OptimizerStatistics {
        self.optimizer.stats().await
    }

    pub async fn invalidate(
        &self,
        source_lang: &str,
        target_lang: &str,
        content_type: Option<ContentType>,
    ) {
        self.cache.invalidate(source_lang, target_lang, content_type).await;
    }

    /// Pre-populate the cache with `(text, src, tgt, translation)` tuples.
    pub async fn warm_cache(&self, entries: Vec<(String, String, String, String)>) {
        self.cache.warm(entries).await;
    }

    pub async fn stats(&self) -> ControllerStatistics {
        ControllerStatistics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            optimizations_triggered: self.optimizations_triggered.load(Ordering::Relaxed),
            avg_processing_time_ms: *self.avg_processing_ms.lock().await,
        }
    }

    /// Direct access to the quality engine (e.g. for `compare`).
    pub fn quality_engine(&self) -> &QualityEngine {
        &self.quality
    }

    // ── Pipeline ─────────────────────────────────────────────────────────────

    async fn run(
        &self,
        request: TranslationRequest,
        sink: Option<&dyn ProgressSink>,
    ) -> CoreResult<TranslationResult> {
        request.validate()?;
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match self.pipeline(&request, request_id, started, sink).await {
            Ok(result) => {
                let total_ms = started.elapsed().as_secs_f64() * 1000.0;
                let mut avg = self.avg_processing_ms.lock().await;
                *avg = (*avg + total_ms) / 2.0;
                Ok(result)
            }
            Err(e) => {
                error!("translation failed: {e}");
                if let Some(sink) = sink {
                    safe_emit(
                        sink,
                        TranslationUpdate::status(
                            request_id,
                            TranslationStage::Error,
                            0.0,
                            format!("translation failed: {e}"),
                        ),
                    )
                    .await;
                }
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        request: &TranslationRequest,
        request_id: Uuid,
        started: Instant,
        sink: Option<&dyn ProgressSink>,
    ) -> CoreResult<TranslationResult> {
        let mut stage_times: BTreeMap<String, u64> = BTreeMap::new();

        if let Some(sink) = sink {
            safe_emit(
                sink,
                TranslationUpdate::status(
                    request_id,
                    TranslationStage::Semantic,
                    0.1,
                    "starting semantic translation",
                ),
            )
            .await;
        }

        // 1. Cache lookup. Quality-preference requests read and write the
        // optimized level; everything else stays at the semantic level.
        let level = if request.preference == TranslationPreference::Quality {
            OptimizationLevel::Optimized
        } else {
            OptimizationLevel::Semantic
        };
        let stage_started = Instant::now();
        let cached = self
            .cache
            .get(
                &request.text,
                &request.source_lang,
                &request.target_lang,
                level,
                None,
                None,
            )
            .await;
        stage_times.insert("cache_lookup".into(), elapsed_ms(stage_started));

        if let Some(entry) = cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            let result = self
                .result_from_cache(request, request_id, entry, started, stage_times)
                .await;
            if let Some(sink) = sink {
                safe_emit(
                    sink,
                    TranslationUpdate {
                        request_id,
                        stage: TranslationStage::Semantic,
                        translation: Some(result.translation.clone()),
                        quality_metrics: Some(result.quality_metrics.clone()),
                        chunking_result: Some(result.chunking_result.clone()),
                        progress: 1.0,
                        status_message: "retrieved from cache".into(),
                    },
                )
                .await;
            }
            return Ok(result);
        }

        // 2. Semantic path: chunk, then translate chunks in input order.
        let stage_started = Instant::now();
        let chunking = self
            .chunker
            .chunk(&request.text, &request.source_lang, &request.target_lang)
            .await;
        let chunk_texts = chunking.chunk_texts();
        let translated_chunks = self
            .translate_chunks(&chunk_texts, &request.source_lang, &request.target_lang)
            .await?;
        let semantic_translation = translated_chunks.join(" ");
        stage_times.insert("semantic_translation".into(), elapsed_ms(stage_started));

        if let Some(sink) = sink {
            safe_emit(
                sink,
                TranslationUpdate {
                    request_id,
                    stage: TranslationStage::Semantic,
                    translation: Some(semantic_translation.clone()),
                    quality_metrics: None,
                    chunking_result: Some(chunking.clone()),
                    progress: 0.6,
                    status_message: "semantic translation complete".into(),
                },
            )
            .await;
            safe_emit(
                sink,
                TranslationUpdate::status(
                    request_id,
                    TranslationStage::Analyzing,
                    0.7,
                    "analyzing translation quality",
                ),
            )
            .await;
        }

        // 3. Score the semantic translation against the real chunk joins.
        let stage_started = Instant::now();
        let semantic_pair = TranslationPair::new(request.text.clone(), semantic_translation.clone())
            .with_chunks(chunk_texts.clone(), translated_chunks.clone())
            .with_language_pair(request.source_lang.clone(), request.target_lang.clone());
        let semantic_quality = self.quality.assess(&semantic_pair).await;
        stage_times.insert("quality_assessment".into(), elapsed_ms(stage_started));

        // 4. Decision gate.
        let needs_optimization = self.should_optimize(&semantic_quality, request);

        let mut final_translation = semantic_translation.clone();
        let mut final_quality = semantic_quality.clone();
        let mut final_chunking = chunking.clone();
        let mut optimization_applied = false;
        let mut optimization_time_ms = None;
        let mut metadata = Metadata::new();

        // 5. Optimization path.
        if needs_optimization {
            if let Some(sink) = sink {
                safe_emit(
                    sink,
                    TranslationUpdate {
                        request_id,
                        stage: TranslationStage::Optimizing,
                        translation: Some(semantic_translation.clone()),
                        quality_metrics: Some(semantic_quality.clone()),
                        chunking_result: None,
                        progress: 0.8,
                        status_message: "optimizing translation quality".into(),
                    },
                )
                .await;
            }

            // The deadline budgets the optimization pass itself; time spent
            // on the semantic path is not charged against it.
            let stage_started = Instant::now();
            {
                let strategy = match request.preference {
                    TranslationPreference::Quality => OptimizationStrategy::QualityFocused,
                    TranslationPreference::Fast => OptimizationStrategy::SpeedFocused,
                    TranslationPreference::Balanced => OptimizationStrategy::Balanced,
                };
                let optimization = self
                    .optimizer
                    .optimize(
                        &request.text,
                        &request.source_lang,
                        &request.target_lang,
                        &semantic_translation,
                        semantic_quality.overall_score,
                        strategy,
                        Duration::from_millis(request.optimization_deadline_ms),
                    )
                    .await;

                if optimization.failed() {
                    let timed_out = optimization
                        .metadata
                        .get("deadline_exceeded")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    metadata.insert("optimization_failed".into(), true.into());
                    metadata.insert("optimization_timeout".into(), timed_out.into());
                } else if optimization.quality_improvement > self.config.convergence_threshold {
                    // Accept only if the re-scored winner strictly beats the
                    // semantic translation.
                    let rescored_pair = TranslationPair::new(
                        request.text.clone(),
                        optimization.optimal_translation.clone(),
                    )
                    .with_language_pair(
                        request.source_lang.clone(),
                        request.target_lang.clone(),
                    );
                    let rescored = self.quality.assess(&rescored_pair).await;

                    if rescored.overall_score > semantic_quality.overall_score {
                        final_translation = optimization.optimal_translation.clone();
                        final_quality = rescored;
                        if let Some(chunking) = optimization.optimal_chunking() {
                            final_chunking = chunking.clone();
                        }
                        optimization_applied = true;
                        optimization_time_ms = Some(optimization.total_optimization_time_ms);
                        self.optimizations_triggered.fetch_add(1, Ordering::Relaxed);
                        metadata.insert(
                            "quality_improvement".into(),
                            optimization.quality_improvement.into(),
                        );
                        metadata.insert(
                            "optimization_confidence".into(),
                            optimization.optimization_confidence.into(),
                        );
                        metadata.insert(
                            "convergence_iterations".into(),
                            optimization.convergence_iterations.into(),
                        );
                        metadata.insert(
                            "optimal_chunk_size".into(),
                            optimization.optimal_chunk_size.into(),
                        );
                        info!(
                            "optimization accepted: chunk size {} improved quality {:.3} -> {:.3}",
                            optimization.optimal_chunk_size,
                            semantic_quality.overall_score,
                            final_quality.overall_score
                        );
                    } else {
                        metadata.insert(
                            "optimization_rejected".into(),
                            "re-scored winner did not beat the semantic translation".into(),
                        );
                    }
                } else {
                    metadata.insert(
                        "optimization_rejected".into(),
                        "improvement below convergence threshold".into(),
                    );
                }
            }
            stage_times.insert("optimization".into(), elapsed_ms(stage_started));

            if let Some(sink) = sink {
                safe_emit(
                    sink,
                    TranslationUpdate {
                        request_id,
                        stage: TranslationStage::Optimized,
                        translation: Some(final_translation.clone()),
                        quality_metrics: Some(final_quality.clone()),
                        chunking_result: Some(final_chunking.clone()),
                        progress: 1.0,
                        status_message: if optimization_applied {
                            "optimization complete".into()
                        } else {
                            "optimization did not improve quality; keeping semantic translation"
                                .into()
                        },
                    },
                )
                .await;
            }
        } else if let Some(sink) = sink {
            safe_emit(
                sink,
                TranslationUpdate {
                    request_id,
                    stage: TranslationStage::Semantic,
                    translation: Some(final_translation.clone()),
                    quality_metrics: Some(final_quality.clone()),
                    chunking_result: Some(final_chunking.clone()),
                    progress: 1.0,
                    status_message: "translation complete - high quality achieved".into(),
                },
            )
            .await;
        }

        // 6. Cache the accepted translation at the chosen level.
        self.cache
            .put(CacheWriteRequest {
                text: request.text.clone(),
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
                optimization_level: level,
                translation: final_translation.clone(),
                quality_metrics: Some(final_quality.clone()),
                chunking_result: Some(final_chunking.clone()),
                chunk_size: None,
                content_type: None,
                optimization_time_ms,
            })
            .await;

        metadata.insert("request_id".into(), request_id.to_string().into());
        metadata.insert("user_preference".into(), preference_name(request.preference).into());
        metadata.insert("source_lang".into(), request.source_lang.clone().into());
        metadata.insert("target_lang".into(), request.target_lang.clone().into());
        metadata.insert("needs_optimization".into(), needs_optimization.into());

        Ok(TranslationResult {
            translation: final_translation,
            original_text: request.text.clone(),
            quality_metrics: final_quality,
            chunking_result: final_chunking,
            processing_time_ms: elapsed_ms(started),
            cache_hit: false,
            optimization_applied,
            stage_times,
            metadata,
        })
    }

    /// Translate chunk texts, preserving input order in the output. A single
    /// chunk takes the direct path; multiple chunks fan out in parallel under
    /// the global translator bound.
    async fn translate_chunks(
        &self,
        chunks: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> CoreResult<Vec<String>> {
        if chunks.is_empty() {
            return Err(CoreError::Internal(
                "chunker produced no chunks for non-empty input".into(),
            ));
        }
        if chunks.len() == 1 {
            let translation = self
                .translator
                .translate(&chunks[0], source_lang, target_lang)
                .await
                .map_err(|e| CoreError::upstream("translator", e))?;
            return Ok(vec![translation]);
        }
        let futures = chunks
            .iter()
            .map(|chunk| self.translator.translate(chunk, source_lang, target_lang));
        futures::future::try_join_all(futures)
            .await
            .map_err(|e| CoreError::upstream("translator", e))
    }

    /// Build a result from a cache hit, recomputing metrics or chunking for
    /// entries that were stored without them (e.g. warm-cache writes).
    async fn result_from_cache(
        &self,
        request: &TranslationRequest,
        request_id: Uuid,
        entry: CacheEntry,
        started: Instant,
        stage_times: BTreeMap<String, u64>,
    ) -> TranslationResult {
        let chunking = match entry.chunking_result.clone() {
            Some(chunking) => chunking,
            None => {
                self.chunker
                    .chunk(&request.text, &request.source_lang, &request.target_lang)
                    .await
            }
        };
        let quality = match entry.quality_metrics.clone() {
            Some(quality) => quality,
            None => {
                let pair = TranslationPair::new(request.text.clone(), entry.translation.clone())
                    .with_language_pair(
                        request.source_lang.clone(),
                        request.target_lang.clone(),
                    );
                self.quality.assess(&pair).await
            }
        };

        let mut metadata = Metadata::new();
        metadata.insert("request_id".into(), request_id.to_string().into());
        metadata.insert("cache_hit".into(), true.into());
        metadata.insert("cached_created_at".into(), entry.created_at.to_rfc3339().into());
        metadata.insert("cache_access_count".into(), entry.access_count.into());

        TranslationResult {
            translation: entry.translation,
            original_text: request.text.clone(),
            quality_metrics: quality,
            chunking_result: chunking,
            processing_time_ms: elapsed_ms(started),
            cache_hit: true,
            optimization_applied: entry.key.optimization_level == OptimizationLevel::Optimized,
            stage_times,
            metadata,
        }
    }

    /// The decision gate. `force_optimization` wins over everything, `Fast`
    /// then disables optimization regardless of score, and the preference
    /// thresholds tighten the default quality threshold.
    fn should_optimize(&self, quality: &QualityMetrics, request: &TranslationRequest) -> bool {
        if request.force_optimization {
            return true;
        }
        match request.preference {
            TranslationPreference::Fast => return false,
            TranslationPreference::Quality
                if quality.overall_score < QUALITY_PREFERENCE_THRESHOLD =>
            {
                return true
            }
            TranslationPreference::Balanced
                if quality.overall_score < BALANCED_PREFERENCE_THRESHOLD =>
            {
                return true
            }
            _ => {}
        }
        quality.overall_score < self.config.quality_threshold
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn preference_name(preference: TranslationPreference) -> &'static str {
    match preference {
        TranslationPreference::Fast => "fast",
        TranslationPreference::Balanced => "balanced",
        TranslationPreference::Quality => "quality",
    }
}
