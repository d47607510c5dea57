//! Adaptive translation optimization core.
//!
//! Sits in front of any translation backend and improves quality for
//! heterogeneous text: content-aware semantic chunking, eight-dimension
//! quality scoring, binary-search chunk-size optimization under a deadline,
//! and a two-tier cache with embedding-similarity reuse. The backend itself
//! (translator, embedder, shared KV store) plugs in through the capability
//! traits in [`backend`].

pub mod backend;
pub mod cache;
pub mod chunker;
pub mod controller;
pub mod core;
pub mod nlp;
pub mod optimizer;
pub mod quality;

// --- Primary exports ---
pub use backend::{BoundedTranslator, Embedder, KvStore, Translator};
pub use cache::{
    CacheEntry, CacheKey, CacheStatistics, CacheWriteRequest, OptimizationLevel, TranslationCache,
};
pub use chunker::{Chunk, ChunkingResult, ContentType, DiscourseFeatures, SemanticChunker};
pub use controller::{AdaptiveController, ControllerStatistics, ProgressSink};
pub use core::config::AdaptiveConfig;
pub use core::error::{CoreError, CoreResult};
pub use core::types::{
    TranslationPreference, TranslationRequest, TranslationResult, TranslationStage,
    TranslationUpdate,
};
pub use optimizer::{
    BinarySearchOptimizer, OptimizationPoint, OptimizationResult, OptimizationStrategy,
    OptimizerStatistics,
};
pub use quality::{
    QualityDimension, QualityEngine, QualityGrade, QualityMetrics, TranslationComparison,
    TranslationPair,
};
