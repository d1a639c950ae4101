//! Two-tier response cache
//!
//! Tier 1 is an exact lookup on the normalized query string with a sliding
//! TTL: a popular query never expires while it keeps being asked, an
//! abandoned one does. Tier 2 is a capacity-bounded semantic tier scanned by
//! embedding similarity, evicting the least-recently-accessed entry when
//! full.
//!
//! The cache is advisory. Reads may race writes and a lost update is
//! acceptable; a torn entry is not: every mutation is whole-entry under a
//! lock, so readers always observe internally consistent
//! query/embedding/response triples.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::config::CacheConfig;
use crate::vector::cosine_similarity;

/// A cached response plus the bookkeeping both tiers share.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: String,
    pub sources_used: Vec<String>,
}

#[derive(Debug, Clone)]
struct ExactEntry {
    response: String,
    sources_used: Vec<String>,
    expires_at: DateTime<Utc>,
    use_count: u64,
}

#[derive(Debug, Clone)]
struct SemanticEntry {
    normalized_query: String,
    embedding: Vec<f32>,
    response: String,
    sources_used: Vec<String>,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    use_count: u64,
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub exact_entries: usize,
    pub semantic_entries: usize,
}

/// Shared across all concurrent queries; the only mutable state in the core.
pub struct QueryCache {
    exact: Mutex<LruCache<String, ExactEntry>>,
    semantic: RwLock<Vec<SemanticEntry>>,
    config: CacheConfig,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Exact-tier key: lowercase, punctuation stripped, whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
    let folded = crate::text::normalize_for_search(query);
    folded
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.exact_capacity.max(1))
            .expect("capacity is at least 1");
        Self {
            exact: Mutex::new(LruCache::new(capacity)),
            semantic: RwLock::new(Vec::new()),
            config,
            exact_hits: AtomicU64::new(0),
            semantic_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Exact-tier probe. A hit extends the entry's TTL by the sliding
    /// window; an expired entry is dropped on sight.
    pub fn get_exact(&self, query: &str) -> Option<CachedResponse> {
        let key = normalize_query(query);
        let now = Utc::now();
        let mut exact = self.exact.lock();

        match exact.get_mut(&key) {
            Some(entry) if entry.expires_at > now => {
                entry.use_count += 1;
                let slide = now + Duration::seconds(self.config.slide_secs as i64);
                if slide > entry.expires_at {
                    entry.expires_at = slide;
                }
                self.exact_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Exact cache hit");
                Some(CachedResponse {
                    response: entry.response.clone(),
                    sources_used: entry.sources_used.clone(),
                })
            }
            Some(_) => {
                exact.pop(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Semantic-tier probe: linear cosine scan, hit iff the best match
    /// reaches the similarity threshold. Skipped entirely by callers that
    /// have no query embedding.
    pub fn get_semantic(&self, embedding: &[f32]) -> Option<CachedResponse> {
        let best = {
            let semantic = self.semantic.read();
            semantic
                .iter()
                .map(|entry| (entry.normalized_query.clone(), cosine_similarity(embedding, &entry.embedding)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        };

        let (key, score) = best?;
        if score < self.config.semantic_threshold {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // Touch under the write lock; the entry may have been evicted since
        // the scan, in which case the hit is forfeited (advisory cache).
        let mut semantic = self.semantic.write();
        let entry = semantic.iter_mut().find(|e| e.normalized_query == key)?;
        entry.last_accessed = Utc::now();
        entry.use_count += 1;
        self.semantic_hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(score, "Semantic cache hit");
        Some(CachedResponse {
            response: entry.response.clone(),
            sources_used: entry.sources_used.clone(),
        })
    }

    /// Store a completed answer in both tiers (semantic only when the query
    /// embedding exists). Whole-entry writes; a full semantic tier evicts
    /// its least-recently-accessed entry.
    pub fn put(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        response: &str,
        sources_used: &[String],
    ) {
        let key = normalize_query(query);
        let now = Utc::now();

        {
            let mut exact = self.exact.lock();
            exact.put(
                key.clone(),
                ExactEntry {
                    response: response.to_string(),
                    sources_used: sources_used.to_vec(),
                    expires_at: now + Duration::seconds(self.config.ttl_secs as i64),
                    use_count: 0,
                },
            );
        }

        let Some(embedding) = embedding else {
            return;
        };

        let mut semantic = self.semantic.write();
        if let Some(existing) = semantic.iter_mut().find(|e| e.normalized_query == key) {
            existing.embedding = embedding.to_vec();
            existing.response = response.to_string();
            existing.sources_used = sources_used.to_vec();
            existing.last_accessed = now;
            return;
        }

        if semantic.len() >= self.config.semantic_capacity {
            if let Some(oldest) = semantic
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(idx, _)| idx)
            {
                let evicted = semantic.swap_remove(oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    key = %evicted.normalized_query,
                    age_secs = (now - evicted.created_at).num_seconds(),
                    uses = evicted.use_count,
                    "Semantic cache full, evicted least-recently-used entry"
                );
            }
        }

        semantic.push(SemanticEntry {
            normalized_query: key,
            embedding: embedding.to_vec(),
            response: response.to_string(),
            sources_used: sources_used.to_vec(),
            created_at: now,
            last_accessed: now,
            use_count: 0,
        });
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            exact_entries: self.exact.lock().len(),
            semantic_entries: self.semantic.read().len(),
        }
    }

    #[cfg(test)]
    fn semantic_queries(&self) -> Vec<String> {
        self.semantic
            .read()
            .iter()
            .map(|e| e.normalized_query.clone())
            .collect()
    }
}
