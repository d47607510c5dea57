//! Multi-level translation cache.
//!
//! L1 is an in-process strict-LRU map guarded by one mutex; L2 is a shared
//! KV store with a TTL, keyed by the stable storage string from [`key`].
//! A miss on both tiers can still be served by the similarity fallback:
//! embed the query text, compare against cached originals for the same
//! language pair and level, and copy-write the closest entry under the new
//! key when it clears the threshold.
//!
//! L2 absence or failure never surfaces: every L2 call degrades to L1-only
//! with a warning. Counters are relaxed atomics; exact cross-counter
//! consistency is only guaranteed on single-threaded workloads.

pub mod key;

use crate::backend::{Embedder, KvStore};
use crate::chunker::{ChunkingResult, ContentType};
use crate::core::config::AdaptiveConfig;
use crate::nlp::cosine_similarity;
use crate::quality::QualityMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use key::{fingerprint, CacheKey, OptimizationLevel};

/// Per-pattern bucket size cap; oldest entries are dropped beyond this.
const PATTERN_BUCKET_CAP: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Entries and statistics
// ─────────────────────────────────────────────────────────────────────────────

/// One cached translation with its provenance. Survives an L2 round-trip
/// with structural equality on all closed-set fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub translation: String,
    /// Exact original text. Optional because older L2 payloads may predate
    /// the field; the similarity fallback then reconstructs from chunks.
    #[serde(default)]
    pub source_text: Option<String>,
    #[serde(default)]
    pub quality_metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub chunking_result: Option<ChunkingResult>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub hit_count: u64,
    #[serde(default)]
    pub optimization_time_ms: Option<u64>,
}

impl CacheEntry {
    /// Original text for similarity comparison: the stored source when
    /// present, else the space-joined chunks (lossy on whitespace).
    fn original_text(&self) -> Option<String> {
        if let Some(text) = &self.source_text {
            return Some(text.clone());
        }
        let chunking = self.chunking_result.as_ref()?;
        if chunking.chunks.is_empty() {
            return None;
        }
        Some(
            chunking
                .chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// Snapshot of cache performance counters and tier sizes.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub avg_access_time_ms: f64,
    pub l1_entries: usize,
    pub pattern_entries: usize,
    pub l2_available: bool,
}

/// Everything needed to create one cache entry.
#[derive(Debug, Clone)]
pub struct CacheWriteRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub optimization_level: OptimizationLevel,
    pub translation: String,
    pub quality_metrics: Option<QualityMetrics>,
    pub chunking_result: Option<ChunkingResult>,
    pub chunk_size: Option<usize>,
    pub content_type: Option<ContentType>,
    pub optimization_time_ms: Option<u64>,
}

impl CacheWriteRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        optimization_level: OptimizationLevel,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            optimization_level,
            translation: translation.into(),
            quality_metrics: None,
            chunking_result: None,
            chunk_size: None,
            content_type: None,
            optimization_time_ms: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TranslationCache
// ─────────────────────────────────────────────────────────────────────────────

/// L1 map, LRU order, pattern buckets, and the rolling access-time average,
/// all mutated under the one guard.
#[derive(Default)]
struct L1State {
    entries: HashMap<String, CacheEntry>,
    /// Access order, least recent at the front.
    order: VecDeque<String>,
    /// `{src}_{tgt}_{content_type|default}` → storage keys, oldest first.
    /// Keys may dangle after L1 eviction until bucket capacity drops them.
    patterns: HashMap<String, VecDeque<String>>,
    avg_access_ms: f64,
}

pub struct TranslationCache {
    capacity: usize,
    similarity_threshold: f32,
    l2_ttl: Duration,
    state: Mutex<L1State>,
    kv: Option<Arc<dyn KvStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl TranslationCache {
    pub fn new(
        config: &AdaptiveConfig,
        kv: Option<Arc<dyn KvStore>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            capacity: config.cache_l1_capacity,
            similarity_threshold: config.cache_similarity_threshold,
            l2_ttl: Duration::from_secs(config.cache_l2_ttl_seconds),
            state: Mutex::new(L1State::default()),
            kv,
            embedder,
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Multi-level lookup: L1 → L2 → similarity fallback.
    pub async fn get(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        optimization_level: OptimizationLevel,
        chunk_size: Option<usize>,
        content_type: Option<ContentType>,
    ) -> Option<CacheEntry> {
        let started = Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let cache_key = CacheKey::new(text, source_lang, target_lang, optimization_level)
            .with_chunk_size(chunk_size)
            .with_content_type(content_type);
        let storage_key = cache_key.to_storage_string();

        // 1. L1
        {
            let mut state = self.state.lock().await;
            let snapshot = state.entries.get_mut(&storage_key).map(|entry| {
                entry.access_count += 1;
                entry.hit_count += 1;
                entry.clone()
            });
            if let Some(entry) = snapshot {
                touch(&mut state.order, &storage_key);
                record_access(&mut state, started);
                drop(state);
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!("L1 cache hit: {storage_key}");
                return Some(entry);
            }
        }

        // 2. L2
        if let Some(kv) = &self.kv {
            match kv.get(&storage_key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                    Ok(entry) => {
                        let mut state = self.state.lock().await;
                        insert_unlocked(&mut state, storage_key.clone(), entry.clone(), self.capacity);
                        record_access(&mut state, started);
                        drop(state);
                        self.cache_hits.fetch_add(1, Ordering::Relaxed);
                        debug!("L2 cache hit: {storage_key}");
                        return Some(entry);
                    }
                    // Unknown enum values or a stale schema: the entry is
                    // treated as absent, never as an error.
                    Err(e) => warn!("discarding undecodable L2 entry {storage_key}: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!("L2 lookup failed for {storage_key}: {e}"),
            }
        }

        // 3. Similarity fallback
        if let Some(similar) = self
            .find_similar(text, source_lang, target_lang, optimization_level)
            .await
        {
            let copied = CacheEntry {
                key: cache_key,
                translation: similar.translation.clone(),
                source_text: Some(text.to_string()),
                quality_metrics: similar.quality_metrics.clone(),
                chunking_result: similar.chunking_result.clone(),
                created_at: Utc::now(),
                access_count: 0,
                hit_count: 0,
                optimization_time_ms: similar.optimization_time_ms,
            };
            self.insert_and_persist(copied.clone()).await;
            {
                let mut state = self.state.lock().await;
                record_access(&mut state, started);
            }
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(copied);
        }

        // 4. Miss
        {
            let mut state = self.state.lock().await;
            record_access(&mut state, started);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        debug!("cache miss: {storage_key}");
        None
    }

    /// Write a translation to both tiers and the pattern bucket.
    pub async fn put(&self, write: CacheWriteRequest) {
        let cache_key = CacheKey::new(
            &write.text,
            &write.source_lang,
            &write.target_lang,
            write.optimization_level,
        )
        .with_chunk_size(write.chunk_size)
        .with_content_type(write.content_type);

        let entry = CacheEntry {
            key: cache_key,
            translation: write.translation,
            source_text: Some(write.text),
            quality_metrics: write.quality_metrics,
            chunking_result: write.chunking_result,
            created_at: Utc::now(),
            access_count: 0,
            hit_count: 0,
            optimization_time_ms: write.optimization_time_ms,
        };
        self.insert_and_persist(entry).await;
    }

    /// Pre-populate the cache with known-good translations at the semantic
    /// level.
    pub async fn warm(&self, entries: Vec<(String, String, String, String)>) {
        info!("warming cache with {} translations", entries.len());
        for (text, source_lang, target_lang, translation) in entries {
            self.put(CacheWriteRequest::new(
                text,
                source_lang,
                target_lang,
                OptimizationLevel::Semantic,
                translation,
            ))
            .await;
        }
    }

    /// Drop every entry for a language pair, optionally narrowed to one
    /// content type (matched on key fields).
    pub async fn invalidate(
        &self,
        source_lang: &str,
        target_lang: &str,
        content_type: Option<ContentType>,
    ) {
        let removed = {
            let mut state = self.state.lock().await;
            let doomed: Vec<String> = state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    entry.key.source_lang == source_lang
                        && entry.key.target_lang == target_lang
                        && content_type.map_or(true, |ct| entry.key.content_type == Some(ct))
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &doomed {
                state.entries.remove(key);
                if let Some(pos) = state.order.iter().position(|k| k == key) {
                    state.order.remove(pos);
                }
            }
            doomed.len()
        };

        let mut l2_removed = 0u64;
        if let Some(kv) = &self.kv {
            let pattern = format!("tr:*:{source_lang}:{target_lang}:*");
            match kv.keys(&pattern).await {
                Ok(mut keys) => {
                    if let Some(ct) = content_type {
                        let suffix = format!(":type_{ct}");
                        keys.retain(|k| k.contains(&suffix));
                    }
                    if !keys.is_empty() {
                        match kv.delete(&keys).await {
                            Ok(n) => l2_removed = n,
                            Err(e) => warn!("L2 invalidation delete failed: {e}"),
                        }
                    }
                }
                Err(e) => warn!("L2 invalidation scan failed: {e}"),
            }
        }

        info!(
            "invalidated {removed} L1 and {l2_removed} L2 entries for {source_lang}->{target_lang}"
        );
    }

    /// Counter snapshot plus tier sizes. Hit rate is computed from the
    /// current counter values, not maintained incrementally.
    pub async fn stats(&self) -> CacheStatistics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let state = self.state.lock().await;
        CacheStatistics {
            total_requests,
            cache_hits,
            cache_misses,
            hit_rate: if total_requests > 0 {
                cache_hits as f64 / total_requests as f64
            } else {
                0.0
            },
            avg_access_time_ms: state.avg_access_ms,
            l1_entries: state.entries.len(),
            pattern_entries: state.patterns.values().map(VecDeque::len).sum(),
            l2_available: self.kv.is_some(),
        }
    }

    /// Health-check the L2 tier. `false` when no store is configured or the
    /// ping fails.
    pub async fn ping_l2(&self) -> bool {
        match &self.kv {
            Some(kv) => kv.ping().await.is_ok(),
            None => false,
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn insert_and_persist(&self, entry: CacheEntry) {
        let storage_key = entry.key.to_storage_string();

        // Pattern bucket name falls back to the chunking result's content
        // type when the key carries none.
        let bucket_type = entry
            .key
            .content_type
            .or_else(|| entry.chunking_result.as_ref().map(|c| c.content_type));
        let pattern = format!(
            "{}_{}_{}",
            entry.key.source_lang,
            entry.key.target_lang,
            bucket_type.map(ContentType::as_str).unwrap_or("default")
        );

        {
            let mut state = self.state.lock().await;
            insert_unlocked(&mut state, storage_key.clone(), entry.clone(), self.capacity);
            let bucket = state.patterns.entry(pattern).or_default();
            bucket.push_back(storage_key.clone());
            while bucket.len() > PATTERN_BUCKET_CAP {
                bucket.pop_front();
            }
        }

        if let Some(kv) = &self.kv {
            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    if let Err(e) = kv.set_ex(&storage_key, &bytes, self.l2_ttl).await {
                        warn!("L2 write failed for {storage_key}: {e}");
                    }
                }
                Err(e) => warn!("L2 serialization failed for {storage_key}: {e}"),
            }
        }
    }

    /// Best entry for the same language pair and level whose original text
    /// embeds close enough to the query. One batch embed call covers the
    /// query and every candidate.
    async fn find_similar(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        optimization_level: OptimizationLevel,
    ) -> Option<CacheEntry> {
        let embedder = self.embedder.as_ref()?;

        let candidates: Vec<(String, String)> = {
            let state = self.state.lock().await;
            state
                .entries
                .iter()
                .filter(|(_, entry)| {
                    entry.key.source_lang == source_lang
                        && entry.key.target_lang == target_lang
                        && entry.key.optimization_level == optimization_level
                })
                .filter_map(|(key, entry)| entry.original_text().map(|t| (key.clone(), t)))
                .collect()
        };
        if candidates.is_empty() {
            return None;
        }

        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(text.to_string());
        texts.extend(candidates.iter().map(|(_, t)| t.clone()));

        let vectors = match embedder.embed(&texts).await {
            Ok(v) if v.len() == texts.len() => v,
            Ok(_) => return None,
            Err(e) => {
                warn!("similarity lookup embedding failed: {e}");
                return None;
            }
        };

        let query = &vectors[0];
        let mut best: Option<(f32, &str)> = None;
        for (i, (storage_key, _)) in candidates.iter().enumerate() {
            let similarity = cosine_similarity(query, &vectors[i + 1]);
            if similarity >= self.similarity_threshold
                && best.map_or(true, |(b, _)| similarity > b)
            {
                best = Some((similarity, storage_key));
            }
        }
        let (similarity, storage_key) = best?;
        debug!("similarity cache hit at {similarity:.3}");

        // The entry may have been evicted while we were embedding.
        let state = self.state.lock().await;
        state.entries.get(storage_key).cloned()
    }
}

/// Move `key` to the most-recent end of the access order.
fn touch(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.to_string());
}

/// Insert into L1, evicting least-recently-used entries down to `capacity`.
fn insert_unlocked(state: &mut L1State, storage_key: String, entry: CacheEntry, capacity: usize) {
    if state.entries.contains_key(&storage_key) {
        if let Some(pos) = state.order.iter().position(|k| k == &storage_key) {
            state.order.remove(pos);
        }
    }
    state.entries.insert(storage_key.clone(), entry);
    state.order.push_back(storage_key);
    while state.entries.len() > capacity {
        let Some(oldest) = state.order.pop_front() else {
            break;
        };
        state.entries.remove(&oldest);
    }
}

/// Rolling average in the style of the controller's other running averages.
fn record_access(state: &mut L1State, started: Instant) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    state.avg_access_ms = (state.avg_access_ms + elapsed_ms) / 2.0;
}
