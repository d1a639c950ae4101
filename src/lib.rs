//! Retrieval core for the internal IT helpdesk assistant.
//!
//! Takes a free-text question (Spanish or English), retrieves supporting
//! evidence from heterogeneous document sources with hybrid keyword +
//! semantic search, assembles a priority-ordered context block, and produces
//! a grounded answer through an injected LLM client. Exposed as a library;
//! the HTTP/UI layer, the source readers, and the model endpoints all live
//! outside and plug in through the traits in [`providers`].

pub mod assembler;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod expand;
pub mod intent;
pub mod providers;
pub mod retriever;
pub mod text;
pub mod types;
pub mod vector;

// Re-export the primary surface for convenience
pub use cache::{CacheStats, QueryCache};
pub use config::AgentConfig;
pub use engine::AssistantEngine;
pub use error::AgentError;
pub use providers::{
    ChatClient, DocumentSource, DomainClassifier, EmbeddingClient, FeedbackSink, StaticSource,
};
pub use types::{
    AgentResponse, ChatRole, ChatTurn, Document, FeedbackRecord, QueryDomain, QueryIntent,
    SourceKind,
};

// Re-export the cancellation token so callers do not need a direct
// tokio-util dependency just to call `ask`.
pub use tokio_util::sync::CancellationToken;
