use crate::chunker::ChunkingResult;
use crate::core::error::{CoreError, CoreResult};
use crate::quality::QualityMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form key/value metadata attached to results and updates.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

/// Quality/speed trade-off requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPreference {
    /// Semantic fast path only; never optimize.
    Fast,
    /// Optimize when quality drops below 0.80.
    #[default]
    Balanced,
    /// Optimize when quality drops below 0.85; cache at the optimized level.
    Quality,
}

/// A single translation request handed to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    /// ISO 639-1 source code, or `auto` for detection.
    pub source_lang: String,
    /// ISO 639-1 target code.
    pub target_lang: String,
    #[serde(default)]
    pub preference: TranslationPreference,
    #[serde(default)]
    pub force_optimization: bool,
    /// Wall-clock budget for the optimization pass.
    #[serde(default = "default_deadline_ms")]
    pub optimization_deadline_ms: u64,
}

fn default_deadline_ms() -> u64 {
    5_000
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            preference: TranslationPreference::default(),
            force_optimization: false,
            optimization_deadline_ms: default_deadline_ms(),
        }
    }

    pub fn with_preference(mut self, preference: TranslationPreference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_force_optimization(mut self, force: bool) -> Self {
        self.force_optimization = force;
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.optimization_deadline_ms = deadline_ms;
        self
    }

    /// Reject malformed requests before any upstream work starts.
    pub fn validate(&self) -> CoreResult<()> {
        if self.text.trim().is_empty() {
            return Err(CoreError::InvalidInput("text must not be empty".into()));
        }
        if !is_valid_lang_code(&self.source_lang, true) {
            return Err(CoreError::InvalidInput(format!(
                "invalid source language code: {:?}",
                self.source_lang
            )));
        }
        if !is_valid_lang_code(&self.target_lang, false) {
            return Err(CoreError::InvalidInput(format!(
                "invalid target language code: {:?}",
                self.target_lang
            )));
        }
        Ok(())
    }
}

/// ISO 639-1 shaped code: exactly two ASCII letters. `auto` only for sources.
fn is_valid_lang_code(code: &str, allow_auto: bool) -> bool {
    if allow_auto && code == "auto" {
        return true;
    }
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_lowercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Progressive updates
// ─────────────────────────────────────────────────────────────────────────────

/// Pipeline stage reported in progressive updates and stage timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStage {
    Semantic,
    Analyzing,
    Optimizing,
    Optimized,
    Error,
}

/// One progressive update. Updates for a request are emitted in stage order
/// and never reorder.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationUpdate {
    pub request_id: Uuid,
    pub stage: TranslationStage,
    pub translation: Option<String>,
    pub quality_metrics: Option<QualityMetrics>,
    pub chunking_result: Option<ChunkingResult>,
    /// Rough completion fraction in `[0, 1]`.
    pub progress: f64,
    pub status_message: String,
}

impl TranslationUpdate {
    pub(crate) fn status(request_id: Uuid, stage: TranslationStage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            stage,
            translation: None,
            quality_metrics: None,
            chunking_result: None,
            progress,
            status_message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────────────────────────────────────

/// Final output of one controller run.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationResult {
    pub translation: String,
    pub original_text: String,
    pub quality_metrics: QualityMetrics,
    pub chunking_result: ChunkingResult,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    pub optimization_applied: bool,
    /// Per-stage wall-clock deltas in milliseconds.
    pub stage_times: BTreeMap<String, u64>,
    pub metadata: Metadata,
}
