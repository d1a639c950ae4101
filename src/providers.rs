//! External collaborator seams
//!
//! The LLM, the embedding service, the four document-source readers, the
//! LLM domain-classifier fallback, and the feedback sink all live outside
//! this crate behind these traits. The core wraps every call in a bounded
//! timeout; implementations do not need their own.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChatTurn, Document, FeedbackRecord, QueryDomain, SourceKind};

/// Opaque "text → fixed-length float vector" service.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Opaque "complete chat given prompt + context + history" service.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String>;
}

/// One-word domain classification used only when no keyword rule fires.
/// Any failure is treated as "General" by the caller, never propagated.
#[async_trait]
pub trait DomainClassifier: Send + Sync {
    async fn classify_domain(&self, query: &str) -> Result<QueryDomain>;
}

/// A read-only snapshot of one document source. Loading and refreshing the
/// snapshot is the reader's own concern; the core never triggers it.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    async fn list_all(&self) -> Result<Vec<Document>>;
}

/// Receives the structured record the feedback/learning subsystem persists.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, record: FeedbackRecord);
}

/// In-memory `DocumentSource` over a preloaded snapshot. The production
/// wiki/KB/harvester readers live outside the crate; tests and local tools
/// use this.
pub struct StaticSource {
    kind: SourceKind,
    documents: Vec<Document>,
}

impl StaticSource {
    pub fn new(kind: SourceKind, documents: Vec<Document>) -> Self {
        Self { kind, documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn list_all(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}
