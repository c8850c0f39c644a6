//! Error taxonomy for the core.
//!
//! Each variant maps to one degradation policy: invalid input is clamped or
//! ignored at the boundary and never propagates, unavailable backends degrade
//! to partial results, transient tool noise is swallowed, broken invariants
//! abort the single call that observed them, and cancellation returns early
//! without mutation.

/// Core error type shared across all subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration or state document out of range. Callers clamp and log
    /// instead of surfacing this; it exists for the few constructors that
    /// cannot produce a usable value at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An embedding service, vector store, or hybrid backend failed.
    /// Search paths skip the backend; the embedding path falls back to the
    /// deterministic hash embedder.
    #[error("backend unavailable: {backend}: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// A single tool invocation failed inside a guardian scan. Swallowed.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A structural invariant was broken (e.g. a bandit arm matrix that is
    /// no longer positive-definite). The call that observed it aborts;
    /// router state remains usable for the next call.
    #[error("invariant violated: {0}")]
    Fatal(String),

    /// Caller-driven cancellation. No state was mutated.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying storage error from the vector index.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn backend(backend: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}
