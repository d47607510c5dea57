//! Cache key construction and the stable L2 stringification contract.

use crate::chunker::ContentType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Tag distinguishing fast-path output from a binary-search winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Semantic,
    Optimized,
}

impl OptimizationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Optimized => "optimized",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable 64-bit fingerprint of the exact input text: the first 8 bytes of
/// its SHA-256 digest, hex encoded. Identical across processes and runs.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Structured, immutable cache key. Equality is structural over all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub fingerprint: String,
    pub source_lang: String,
    pub target_lang: String,
    pub chunk_size: Option<usize>,
    pub content_type: Option<ContentType>,
    pub optimization_level: OptimizationLevel,
}

impl CacheKey {
    pub fn new(
        text: &str,
        source_lang: &str,
        target_lang: &str,
        optimization_level: OptimizationLevel,
    ) -> Self {
        Self {
            fingerprint: fingerprint(text),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            chunk_size: None,
            content_type: None,
            optimization_level,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<ContentType>) -> Self {
        self.content_type = content_type;
        self
    }

    /// The persistence contract for L2:
    /// `tr:{fingerprint}:{src}:{tgt}:{level}[:chunk_{size}][:type_{content_type}]`.
    /// Optional fields are appended only when present, in that order.
    pub fn to_storage_string(&self) -> String {
        let mut key = format!(
            "tr:{}:{}:{}:{}",
            self.fingerprint, self.source_lang, self.target_lang, self.optimization_level
        );
        if let Some(size) = self.chunk_size {
            key.push_str(&format!(":chunk_{size}"));
        }
        if let Some(content_type) = self.content_type {
            key.push_str(&format!(":type_{content_type}"));
        }
        key
    }

    /// Pattern bucket name for this key's language pair and content type.
    pub fn pattern_string(&self) -> String {
        format!(
            "{}_{}_{}",
            self.source_lang,
            self.target_lang,
            self.content_type.map(ContentType::as_str).unwrap_or("default")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_64_bit() {
        let a = fingerprint("The cat sat on the mat.");
        let b = fingerprint("The cat sat on the mat.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16); // 8 bytes, hex encoded
        assert_ne!(a, fingerprint("The cat sat on the mat!"));
    }

    #[test]
    fn storage_string_without_optional_fields() {
        let key = CacheKey::new("hello", "en", "fr", OptimizationLevel::Semantic);
        let s = key.to_storage_string();
        assert!(s.starts_with("tr:"));
        assert!(s.ends_with(":en:fr:semantic"));
        assert!(!s.contains(":chunk_"));
        assert!(!s.contains(":type_"));
    }

    #[test]
    fn storage_string_appends_optional_fields_in_order() {
        let key = CacheKey::new("hello", "en", "ru", OptimizationLevel::Optimized)
            .with_chunk_size(Some(450))
            .with_content_type(Some(ContentType::Technical));
        let s = key.to_storage_string();
        assert!(s.ends_with(":en:ru:optimized:chunk_450:type_technical"));
    }

    #[test]
    fn equality_is_structural() {
        let a = CacheKey::new("hello", "en", "fr", OptimizationLevel::Semantic);
        let b = CacheKey::new("hello", "en", "fr", OptimizationLevel::Semantic);
        let c = CacheKey::new("hello", "en", "fr", OptimizationLevel::Optimized);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pattern_string_defaults_content_type() {
        let key = CacheKey::new("hello", "en", "fr", OptimizationLevel::Semantic);
        assert_eq!(key.pattern_string(), "en_fr_default");
        let typed = key.with_content_type(Some(ContentType::Emotional));
        assert_eq!(typed.pattern_string(), "en_fr_emotional");
    }
}
