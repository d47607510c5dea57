use thiserror::Error;

/// Errors surfaced by the adaptive core.
///
/// Only [`CoreError::InvalidInput`] is raised before any work starts; the
/// remaining kinds are handled locally wherever degradation is possible
/// (probe isolation in the optimizer, L2 swallowing in the cache) and only
/// escape when the request cannot produce a translation at all.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The request was malformed before any upstream work began.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A translator, embedder, or L2 store call failed in a position where
    /// the pipeline cannot degrade.
    #[error("upstream {upstream} unavailable: {source}")]
    UpstreamUnavailable {
        upstream: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The optimizer deadline expired. Never escapes the optimizer itself
    /// (it degrades to a failed result); kept for surface completeness.
    #[error("optimization deadline of {deadline_ms}ms exceeded")]
    Timeout { deadline_ms: u64 },

    /// An internal invariant was violated. Indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for wrapping an upstream failure with its component name.
    pub fn upstream(upstream: &'static str, source: anyhow::Error) -> Self {
        Self::UpstreamUnavailable { upstream, source }
    }
}
