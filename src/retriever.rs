//! Hybrid per-source retrieval with Reciprocal Rank Fusion
//!
//! Each source gets a keyword substring pass and a semantic cosine pass,
//! merged rank-wise with RRF. The fan-out across sources is concurrent and
//! best-effort: a failed or timed-out source contributes zero results and a
//! log line, never an error, because partial evidence beats a total failure
//! for an advisory system.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::config::{SearchConfig, TimeoutConfig};
use crate::error::AgentError;
use crate::providers::{DocumentSource, EmbeddingClient};
use crate::text::normalize_for_search;
use crate::types::{Document, SearchResult, SourceKind, SourceResults};
use crate::vector::batch_cosine_similarity;

pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingClient>,
    search: SearchConfig,
    timeouts: TimeoutConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        search: SearchConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self { embedder, search, timeouts }
    }

    /// Embed the query, degrading to keyword-only search on failure or
    /// timeout. The caller reuses the returned embedding for the semantic
    /// cache, so it is computed once per query.
    pub async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        match self.try_embed(query).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to keyword-only search");
                None
            }
        }
    }

    async fn try_embed(&self, query: &str) -> Result<Vec<f32>, AgentError> {
        match tokio::time::timeout(self.timeouts.embedding(), self.embedder.embed(query)).await {
            Ok(Ok(embedding)) if !embedding.is_empty() => Ok(embedding),
            Ok(Ok(_)) => Err(AgentError::EmbeddingUnavailable("empty vector returned".into())),
            Ok(Err(e)) => Err(AgentError::EmbeddingUnavailable(e.to_string())),
            Err(_) => Err(AgentError::EmbeddingUnavailable("timed out".into())),
        }
    }

    /// Search every configured source concurrently and collect the results
    /// in configured source order, so downstream assembly is deterministic
    /// regardless of which source responds first.
    pub async fn search_all(
        &self,
        sources: &[Arc<dyn DocumentSource>],
        query: &str,
        search_terms: &[String],
        embedding: Option<&[f32]>,
    ) -> Vec<SourceResults> {
        let searches = sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let kind = source.kind();
                match self.try_search(&source, query, search_terms, embedding).await {
                    Ok(results) => results,
                    Err(e) => {
                        tracing::warn!(source = kind.as_str(), error = %e, "Source search failed");
                        SourceResults { kind, results: Vec::new(), best_similarity: 0.0 }
                    }
                }
            }
        });

        join_all(searches).await
    }

    async fn try_search(
        &self,
        source: &Arc<dyn DocumentSource>,
        query: &str,
        search_terms: &[String],
        embedding: Option<&[f32]>,
    ) -> Result<SourceResults, AgentError> {
        let kind = source.kind();
        let documents = tokio::time::timeout(self.timeouts.source_search(), source.list_all())
            .await
            .map_err(|_| AgentError::SourceUnavailable { kind, reason: "timed out".into() })?
            .map_err(|e| AgentError::SourceUnavailable { kind, reason: e.to_string() })?;

        let results = self.rank_documents(kind, &documents, query, search_terms, embedding);
        tracing::debug!(
            source = kind.as_str(),
            documents = documents.len(),
            results = results.results.len(),
            best_similarity = results.best_similarity,
            "Source search complete"
        );
        Ok(results)
    }

    /// Rank one source's documents for a query: keyword pass, semantic pass,
    /// RRF fusion.
    fn rank_documents(
        &self,
        kind: SourceKind,
        documents: &[Document],
        query: &str,
        search_terms: &[String],
        embedding: Option<&[f32]>,
    ) -> SourceResults {
        // Needles: the query itself plus every expanded term / sub-query.
        let mut needles = vec![normalize_for_search(query)];
        for term in search_terms {
            let normalized = normalize_for_search(term);
            if !normalized.is_empty() && !needles.contains(&normalized) {
                needles.push(normalized);
            }
        }

        // Keyword pass: stable first-match order over the snapshot.
        let mut keyword_rank: HashMap<usize, usize> = HashMap::new();
        for (idx, doc) in documents.iter().enumerate() {
            let haystack = format!(
                "{} {} {}",
                normalize_for_search(&doc.title),
                normalize_for_search(&doc.content),
                normalize_for_search(&doc.keywords.join(" ")),
            );
            if needles.iter().any(|needle| haystack.contains(needle.as_str())) {
                keyword_rank.insert(idx, keyword_rank.len() + 1);
            }
        }

        // Semantic pass: documents without embeddings participate only in
        // keyword search.
        let mut semantic_rank: HashMap<usize, usize> = HashMap::new();
        let mut best_similarity = 0.0f64;
        if let Some(query_embedding) = embedding {
            let candidates: Vec<usize> = (0..documents.len())
                .filter(|&idx| !documents[idx].embedding.is_empty())
                .collect();
            let vectors: Vec<Vec<f32>> = candidates
                .iter()
                .map(|&idx| documents[idx].embedding.clone())
                .collect();

            let scored = batch_cosine_similarity(
                query_embedding,
                &vectors,
                vectors.len(),
                self.search.min_similarity,
            );
            for (rank, (local_idx, score)) in scored.iter().enumerate() {
                semantic_rank.insert(candidates[*local_idx], rank + 1);
                if *score > best_similarity {
                    best_similarity = *score;
                }
            }
        }

        // Reciprocal Rank Fusion. A document absent from one ranking simply
        // contributes 0 for that term, not a penalty rank.
        let k = self.search.rrf_k as f64;
        let mut fused: Vec<(usize, f64)> = documents
            .iter()
            .enumerate()
            .filter(|(idx, _)| keyword_rank.contains_key(idx) || semantic_rank.contains_key(idx))
            .map(|(idx, _)| {
                let mut score = 0.0;
                if let Some(rank) = keyword_rank.get(&idx) {
                    score += 1.0 / (k + *rank as f64);
                }
                if let Some(rank) = semantic_rank.get(&idx) {
                    score += 1.0 / (k + *rank as f64);
                }
                (idx, score)
            })
            .collect();

        // Deterministic ordering: fused score desc, keyword rank asc, id asc.
        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ka = keyword_rank.get(&a.0).copied().unwrap_or(usize::MAX);
                    let kb = keyword_rank.get(&b.0).copied().unwrap_or(usize::MAX);
                    ka.cmp(&kb)
                })
                .then_with(|| documents[a.0].id.cmp(&documents[b.0].id))
        });
        fused.truncate(self.search.per_source_top_k);

        let results = fused
            .into_iter()
            .enumerate()
            .map(|(position, (idx, score))| SearchResult {
                document: documents[idx].clone(),
                score,
                rank: position + 1,
            })
            .collect();

        SourceResults { kind, results, best_similarity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use crate::config::AgentConfig;
    use crate::providers::StaticSource;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Err(anyhow!("embedding service down"))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl DocumentSource for FailingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Wiki
        }
        async fn list_all(&self) -> anyhow::Result<Vec<Document>> {
            Err(anyhow!("wiki API unreachable"))
        }
    }

    fn doc(id: &str, title: &str, content: &str, embedding: Vec<f32>) -> Document {
        Document { embedding, ..Document::new(id, title, content) }
    }

    fn retriever(embedder: Arc<dyn EmbeddingClient>) -> HybridRetriever {
        let config = AgentConfig::default();
        HybridRetriever::new(embedder, config.search, config.timeouts)
    }

    #[test]
    fn test_rrf_top_in_both_rankings_wins() {
        let r = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let documents = vec![
            doc("a", "vpn access guide", "how to use the vpn", vec![1.0, 0.0]),
            doc("b", "vpn notes", "vpn miscellany", vec![0.9, 0.4]),
            doc("c", "coffee machine", "unrelated", vec![0.0, 1.0]),
        ];

        let results = r.rank_documents(
            SourceKind::KnowledgeBase,
            &documents,
            "vpn",
            &[],
            Some(&[1.0, 0.0]),
        );

        // "a" is ranked first in both passes; nothing may outscore it.
        assert_eq!(results.results[0].document.id, "a");
        for other in &results.results[1..] {
            assert!(results.results[0].score >= other.score);
        }
        assert!((results.best_similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_only_document_still_ranked() {
        let r = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let documents = vec![
            doc("a", "impresora planta 2", "alta de impresora en red", Vec::new()),
            doc("b", "otros temas", "nada relacionado", vec![0.2, 0.3]),
        ];

        let results = r.rank_documents(
            SourceKind::ContextForms,
            &documents,
            "impresora",
            &[],
            Some(&[1.0, 0.0]),
        );

        assert_eq!(results.results[0].document.id, "a");
    }

    #[test]
    fn test_rank_is_one_based_and_sequential() {
        let r = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let documents = vec![
            doc("a", "vpn", "vpn", vec![1.0, 0.0]),
            doc("b", "vpn dos", "vpn", vec![0.8, 0.2]),
        ];

        let results = r.rank_documents(
            SourceKind::Wiki,
            &documents,
            "vpn",
            &[],
            Some(&[1.0, 0.0]),
        );
        let ranks: Vec<usize> = results.results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_embed_failure_degrades_to_keyword_only() {
        let r = retriever(Arc::new(FailingEmbedder));
        assert!(r.embed_query("¿Cómo configuro la VPN?").await.is_none());

        let documents = vec![doc("a", "guia vpn", "configurar vpn zscaler", Vec::new())];
        let results =
            r.rank_documents(SourceKind::KnowledgeBase, &documents, "vpn", &[], None);
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.best_similarity, 0.0);
    }

    #[tokio::test]
    async fn test_failed_source_contributes_empty_results() {
        let r = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        let good = vec![doc("a", "vpn", "vpn guide", vec![1.0, 0.0])];
        let sources: Vec<Arc<dyn DocumentSource>> = vec![
            Arc::new(FailingSource),
            Arc::new(StaticSource::new(SourceKind::KnowledgeBase, good)),
        ];

        let all = r.search_all(&sources, "vpn", &[], Some(&[1.0, 0.0])).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, SourceKind::Wiki);
        assert!(all[0].results.is_empty());
        assert_eq!(all[1].results.len(), 1);
    }

    #[tokio::test]
    async fn test_expanded_terms_widen_keyword_match() {
        let r = retriever(Arc::new(FixedEmbedder(vec![1.0, 0.0])));
        // Document only mentions the English expansion, not the Spanish query.
        let documents = vec![doc(
            "a",
            "Zscaler VPN remote access",
            "Steps for remote access from home",
            Vec::new(),
        )];

        let none = r.rank_documents(
            SourceKind::Wiki,
            &documents,
            "¿Cómo me conecto desde casa?",
            &[],
            None,
        );
        assert!(none.results.is_empty());

        let with_expansion = r.rank_documents(
            SourceKind::Wiki,
            &documents,
            "¿Cómo me conecto desde casa?",
            &["Zscaler VPN remote access".to_string()],
            None,
        );
        assert_eq!(with_expansion.results.len(), 1);
    }
}

