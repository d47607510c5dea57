//! Shared stub backends for integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use lingua_relay::{Embedder, KvStore, Translator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Translator with a fixed phrase table; unknown inputs are echoed back.
/// An optional per-call delay makes stage timings observable.
pub struct PhraseTableTranslator {
    table: HashMap<String, String>,
    delay: Duration,
}

impl PhraseTableTranslator {
    pub fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            table: pairs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            delay: Duration::ZERO,
        })
    }

    pub fn with_delay(pairs: &[(&str, &str)], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            table: pairs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            delay,
        })
    }
}

#[async_trait]
impl Translator for PhraseTableTranslator {
    async fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string()))
    }
}

/// Translator that garbles any input longer than `garble_over` characters and
/// echoes shorter inputs. Makes small chunk sizes win in the optimizer.
pub struct SizeSensitiveTranslator {
    pub garble_over: usize,
}

#[async_trait]
impl Translator for SizeSensitiveTranslator {
    async fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
        if text.chars().count() > self.garble_over {
            Ok("zz zz zz zz zz zz zz zz zz zz zz zz".to_string())
        } else {
            Ok(text.to_string())
        }
    }
}

/// Translator that always fails.
pub struct FailingTranslator;

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(&self, _text: &str, _src: &str, _tgt: &str) -> Result<String> {
        bail!("translation backend offline")
    }
}

/// Translator that sleeps a fixed time before echoing.
pub struct SlowTranslator {
    pub delay: Duration,
}

#[async_trait]
impl Translator for SlowTranslator {
    async fn translate(&self, text: &str, _src: &str, _tgt: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok(text.to_string())
    }
}

/// Embedder with a fixed per-text vector table; unknown texts embed onto a
/// reserved axis so they are dissimilar to everything in the table.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn new(pairs: &[(&str, Vec<f32>)]) -> Arc<Self> {
        Arc::new(Self {
            table: pairs
                .iter()
                .map(|(t, v)| (t.to_string(), v.clone()))
                .collect(),
        })
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0, 0.0, 0.0, 1.0])
            })
            .collect())
    }
}

/// In-memory KV store; TTLs are accepted and ignored.
#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<()> {
        self.data.lock().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let mut data = self.data.lock().await;
        let mut removed = 0;
        for key in keys {
            if data.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let regex = regex_from_glob(pattern);
        Ok(self
            .data
            .lock()
            .await
            .keys()
            .filter(|k| regex.is_match(k))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn regex_from_glob(pattern: &str) -> regex::Regex {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    regex::Regex::new(&format!("^{escaped}$")).expect("invalid glob pattern")
}

/// Route core logs through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
