//! Capability traits for the external collaborators the core consumes.
//!
//! The core never talks to a concrete translation model, embedding model, or
//! KV store; it only sees these single-purpose interfaces. Everything here is
//! object-safe so backends plug in as `Arc<dyn …>` at construction time.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A single `(text, src, tgt) -> text` translation capability.
///
/// Implementations must be safe to invoke concurrently up to the configured
/// bound; language codes are ISO 639-1 at this boundary.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str)
        -> Result<String>;
}

/// Dense-vector embedding capability, used for semantic similarity and
/// coherence scoring. Optional: components degrade to neutral scores when no
/// embedder is configured.
///
/// Output dimensionality is implementation-defined but must be constant for a
/// given embedder; vectors are returned in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Shared KV store backing the L2 cache tier.
///
/// Absence or failure degrades the cache to L1-only; no call on this trait
/// ever surfaces an error to a translation caller.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn delete(&self, keys: &[String]) -> Result<u64>;
    /// Keys matching a glob-style pattern (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn ping(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// BoundedTranslator — the process-wide concurrency gate
// ─────────────────────────────────────────────────────────────────────────────

/// Translator wrapper enforcing the global `max_concurrent_translations`
/// bound. One permit is held per in-flight `translate` call, so chunk
/// translations and optimizer probes all draw from the same pool.
#[derive(Clone)]
pub struct BoundedTranslator {
    inner: Arc<dyn Translator>,
    permits: Arc<Semaphore>,
}

impl BoundedTranslator {
    pub fn new(inner: Arc<dyn Translator>, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String> {
        let _permit = self.permits.acquire().await?;
        self.inner.translate(text, source_lang, target_lang).await
    }

    /// Permits currently available (observability only).
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
