use crate::core::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AdaptiveConfig — the closed configuration set for the adaptive core.
// JSON first (strict: unknown keys are rejected), env-var overrides second.
// ---------------------------------------------------------------------------

/// Tuning knobs for the chunker, quality engine, optimizer, and cache.
///
/// The option set is closed: deserializing a config document containing a key
/// not listed here is an error, not a silent ignore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AdaptiveConfig {
    /// Minimum characters per chunk.
    pub min_chunk_size: usize,
    /// Maximum characters per chunk.
    pub max_chunk_size: usize,
    /// Cosine threshold for grouping sentences into one chunk.
    pub chunker_similarity_threshold: f32,
    /// Cosine threshold for the cache similarity fallback.
    pub cache_similarity_threshold: f32,
    /// Overall quality score below which optimization is considered.
    pub quality_threshold: f64,
    /// Minimum quality improvement for an optimizer run to count as a success.
    pub convergence_threshold: f64,
    /// Upper bound on optimizer search iterations.
    pub max_optimizer_iterations: usize,
    /// Concurrent probe evaluations inside the optimizer.
    pub optimizer_parallel_evaluations: usize,
    /// Process-wide cap on concurrent translator calls.
    pub max_concurrent_translations: usize,
    /// Strict L1 cache capacity (entries).
    pub cache_l1_capacity: usize,
    /// TTL applied to L2 cache writes, in seconds.
    pub cache_l2_ttl_seconds: u64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 150,
            max_chunk_size: 600,
            chunker_similarity_threshold: 0.7,
            cache_similarity_threshold: 0.85,
            quality_threshold: 0.75,
            convergence_threshold: 0.02,
            max_optimizer_iterations: 8,
            optimizer_parallel_evaluations: 3,
            max_concurrent_translations: 5,
            cache_l1_capacity: 1000,
            cache_l2_ttl_seconds: 86_400,
        }
    }
}

impl AdaptiveConfig {
    /// Parse a JSON config document. Unknown keys are rejected.
    pub fn from_json_str(raw: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| CoreError::InvalidInput(format!("config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `LINGUA_RELAY_*` environment overrides applied.
    ///
    /// Unparseable values are ignored (the default stays in effect), matching
    /// the env-fallback behavior of the rest of the stack.
    pub fn from_env() -> CoreResult<Self> {
        let mut config = Self::default();
        apply_env_usize("LINGUA_RELAY_MIN_CHUNK_SIZE", &mut config.min_chunk_size);
        apply_env_usize("LINGUA_RELAY_MAX_CHUNK_SIZE", &mut config.max_chunk_size);
        apply_env_f32(
            "LINGUA_RELAY_CHUNKER_SIMILARITY_THRESHOLD",
            &mut config.chunker_similarity_threshold,
        );
        apply_env_f32(
            "LINGUA_RELAY_CACHE_SIMILARITY_THRESHOLD",
            &mut config.cache_similarity_threshold,
        );
        apply_env_f64("LINGUA_RELAY_QUALITY_THRESHOLD", &mut config.quality_threshold);
        apply_env_f64(
            "LINGUA_RELAY_CONVERGENCE_THRESHOLD",
            &mut config.convergence_threshold,
        );
        apply_env_usize(
            "LINGUA_RELAY_MAX_OPTIMIZER_ITERATIONS",
            &mut config.max_optimizer_iterations,
        );
        apply_env_usize(
            "LINGUA_RELAY_OPTIMIZER_PARALLEL_EVALUATIONS",
            &mut config.optimizer_parallel_evaluations,
        );
        apply_env_usize(
            "LINGUA_RELAY_MAX_CONCURRENT_TRANSLATIONS",
            &mut config.max_concurrent_translations,
        );
        apply_env_usize("LINGUA_RELAY_CACHE_L1_CAPACITY", &mut config.cache_l1_capacity);
        apply_env_u64(
            "LINGUA_RELAY_CACHE_L2_TTL_SECONDS",
            &mut config.cache_l2_ttl_seconds,
        );
        config.validate()?;
        Ok(config)
    }

    /// Range checks over the whole option set.
    pub fn validate(&self) -> CoreResult<()> {
        if self.min_chunk_size == 0 {
            return Err(CoreError::InvalidInput("min_chunk_size must be positive".into()));
        }
        if self.max_chunk_size <= self.min_chunk_size {
            return Err(CoreError::InvalidInput(format!(
                "max_chunk_size ({}) must exceed min_chunk_size ({})",
                self.max_chunk_size, self.min_chunk_size
            )));
        }
        for (name, value) in [
            ("chunker_similarity_threshold", self.chunker_similarity_threshold),
            ("cache_similarity_threshold", self.cache_similarity_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CoreError::InvalidInput(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(CoreError::InvalidInput(format!(
                "quality_threshold must be in [0, 1], got {}",
                self.quality_threshold
            )));
        }
        if self.convergence_threshold < 0.0 {
            return Err(CoreError::InvalidInput(
                "convergence_threshold must be non-negative".into(),
            ));
        }
        for (name, value) in [
            ("max_optimizer_iterations", self.max_optimizer_iterations),
            ("optimizer_parallel_evaluations", self.optimizer_parallel_evaluations),
            ("max_concurrent_translations", self.max_concurrent_translations),
            ("cache_l1_capacity", self.cache_l1_capacity),
        ] {
            if value == 0 {
                return Err(CoreError::InvalidInput(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

fn apply_env_usize(name: &str, slot: &mut usize) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}

fn apply_env_u64(name: &str, slot: &mut u64) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}

fn apply_env_f32(name: &str, slot: &mut f32) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}

fn apply_env_f64(name: &str, slot: &mut f64) {
    if let Some(v) = std::env::var(name).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}
