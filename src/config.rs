use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the retrieval core.
///
/// The defaults carry the empirically chosen constants from the production
/// deployment (RRF k = 60, ambiguity 15 chars / 2 tokens, cache similarity
/// 0.95). They are tunable configuration, not proven-optimal values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ambiguity: AmbiguityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results kept per source after fusion.
    pub per_source_top_k: usize,
    /// RRF constant, shared across all sources for score comparability.
    pub rrf_k: usize,
    /// Best similarity below this flags the answer as low confidence.
    pub relevance_threshold: f64,
    /// Minimum cosine similarity for the semantic pass.
    pub min_similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguityConfig {
    /// Trimmed queries shorter than this are ambiguous.
    pub min_chars: usize,
    /// Queries with at most this many tokens need an allow-listed term.
    pub max_vague_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Exact-tier entries kept (LRU beyond this).
    pub exact_capacity: usize,
    /// Exact-tier time to live.
    pub ttl_secs: u64,
    /// Each access extends the exact-tier TTL by this window.
    pub slide_secs: u64,
    /// Semantic-tier capacity; least-recently-used entry evicted when full.
    pub semantic_capacity: usize,
    /// Embedding similarity at or above this is a semantic-tier hit.
    pub semantic_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum entries kept per priority tier.
    pub max_per_tier: usize,
    /// Character budget for the whole assembled block.
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub source_search_secs: u64,
    pub embedding_secs: u64,
    pub chat_secs: u64,
    pub domain_fallback_secs: u64,
    /// Retries after the first chat completion attempt.
    pub chat_retries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_source_top_k: 10,
            rrf_k: 60,
            relevance_threshold: 0.65,
            min_similarity: 0.0,
        }
    }
}

impl Default for AmbiguityConfig {
    fn default() -> Self {
        Self { min_chars: 15, max_vague_tokens: 2 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            exact_capacity: 1000,
            ttl_secs: 30 * 60,
            slide_secs: 10 * 60,
            semantic_capacity: 500,
            semantic_threshold: 0.95,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_per_tier: 5, max_context_chars: 8000 }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            source_search_secs: 10,
            embedding_secs: 5,
            chat_secs: 60,
            domain_fallback_secs: 3,
            chat_retries: 2,
        }
    }
}

impl TimeoutConfig {
    pub fn source_search(&self) -> Duration {
        Duration::from_secs(self.source_search_secs)
    }
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }
    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }
    pub fn domain_fallback(&self) -> Duration {
        Duration::from_secs(self.domain_fallback_secs)
    }
}

impl AgentConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.search.per_source_top_k == 0 {
            return Err("search.per_source_top_k must be > 0".into());
        }
        if self.search.rrf_k == 0 {
            return Err("search.rrf_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.relevance_threshold) {
            return Err("search.relevance_threshold must be in [0.0, 1.0]".into());
        }
        if self.cache.semantic_capacity == 0 {
            return Err("cache.semantic_capacity must be > 0".into());
        }
        if self.cache.exact_capacity == 0 {
            return Err("cache.exact_capacity must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.cache.semantic_threshold) {
            return Err("cache.semantic_threshold must be in [0.0, 1.0]".into());
        }
        if self.context.max_per_tier == 0 {
            return Err("context.max_per_tier must be > 0".into());
        }
        if self.context.max_context_chars == 0 {
            return Err("context.max_context_chars must be > 0".into());
        }
        if self.ambiguity.min_chars == 0 {
            return Err("ambiguity.min_chars must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_documented_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.search.rrf_k, 60);
        assert_eq!(config.search.relevance_threshold, 0.65);
        assert_eq!(config.ambiguity.min_chars, 15);
        assert_eq!(config.ambiguity.max_vague_tokens, 2);
        assert_eq!(config.cache.semantic_capacity, 500);
        assert_eq!(config.cache.semantic_threshold, 0.95);
        assert_eq!(config.cache.ttl_secs, 30 * 60);
        assert_eq!(config.cache.slide_secs, 10 * 60);
    }

    #[test]
    fn test_validation_rejects_broken_threshold() {
        let mut config = AgentConfig::default();
        config.search.relevance_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
