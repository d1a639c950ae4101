use thiserror::Error;

use crate::types::SourceKind;

/// Error taxonomy of the retrieval core.
///
/// Only `Cancelled` ever escapes `ask`; everything else is recovered
/// internally (empty results, keyword-only fallback) or folded into an
/// `AgentResponse` with `success: false`.
#[derive(Debug, Error)]
pub enum AgentError {
    /// One document source failed or timed out. Recovered locally: that
    /// source contributes empty results.
    #[error("document source {kind:?} unavailable: {reason}")]
    SourceUnavailable { kind: SourceKind, reason: String },

    /// The embedding service failed or timed out. Recovered locally:
    /// keyword-only ranking, semantic cache skipped for this query.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The chat completion call failed after all retries.
    #[error("chat completion failed: {0}")]
    ChatCompletion(String),

    /// The caller's cancellation signal fired mid-query.
    #[error("query cancelled by caller")]
    Cancelled,
}
