//! Context assembly
//!
//! Merges the per-source rankings into one ordered, size-bounded,
//! priority-tagged block. Tier order is fixed ahead of scoring: harvested
//! solutions and user corrections lead, static documentation trails, because
//! the downstream LLM exhibits primacy bias and the ordering deliberately
//! exploits it. Within a tier, intent-weighted fused score decides.

use std::collections::HashSet;

use crate::config::ContextConfig;
use crate::intent::source_weight;
use crate::text::normalize_for_search;
use crate::types::{
    ContextBlock, ContextEntry, QueryDomain, QueryIntent, SourceKind, SourceResults,
};

pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Merge per-source results into the final context block.
    ///
    /// Deterministic: given the same per-source result sets, the output
    /// ordering is byte-identical regardless of fan-out completion order
    /// (inputs are keyed by tier, and all ties break on document id).
    pub fn assemble(
        &self,
        per_source: &[SourceResults],
        intent: QueryIntent,
        domain: QueryDomain,
    ) -> ContextBlock {
        let mut entries: Vec<ContextEntry> = Vec::new();
        let mut best_similarity = 0.0f64;
        let mut semantic_seen = false;

        // Tier-major pass in the fixed priority order.
        for tier in SourceKind::ALL {
            let Some(source) = per_source.iter().find(|s| s.kind == tier) else {
                continue;
            };
            if source.best_similarity > 0.0 {
                semantic_seen = true;
            }
            if source.best_similarity > best_similarity {
                best_similarity = source.best_similarity;
            }

            let weight = source_weight(intent, tier);
            let mut tier_entries: Vec<ContextEntry> = source
                .results
                .iter()
                .filter(|result| !self.excluded_by_domain(tier, domain, result))
                .map(|result| ContextEntry {
                    tier,
                    document: result.document.clone(),
                    score: result.score * weight,
                })
                .collect();

            tier_entries.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.document.id.cmp(&b.document.id))
            });
            tier_entries.truncate(self.config.max_per_tier);
            entries.extend(tier_entries);
        }

        self.deduplicate(&mut entries);
        self.truncate_to_budget(&mut entries);

        let sources_used = entries.iter().map(|e| e.document.id.clone()).collect();

        ContextBlock {
            entries,
            sources_used,
            best_similarity: semantic_seen.then_some(best_similarity),
        }
    }

    /// A ticket-form suggestion tagged with a different domain than the
    /// query's never surfaces: the Network agent must not propose SAP forms.
    fn excluded_by_domain(
        &self,
        tier: SourceKind,
        domain: QueryDomain,
        result: &crate::types::SearchResult,
    ) -> bool {
        if tier != SourceKind::ContextForms || domain == QueryDomain::General {
            return false;
        }
        match result.document.category.as_deref().and_then(QueryDomain::from_label) {
            Some(doc_domain) => doc_domain != QueryDomain::General && doc_domain != domain,
            None => false,
        }
    }

    /// Drop lower-priority duplicates of the same logical document: same id,
    /// or same title after normalization. Entries arrive tier-major, so the
    /// first occurrence is always the highest-priority one.
    fn deduplicate(&self, entries: &mut Vec<ContextEntry>) {
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut seen_titles: HashSet<String> = HashSet::new();

        entries.retain(|entry| {
            let title = normalize_for_search(&entry.document.title);
            if seen_ids.contains(&entry.document.id) || seen_titles.contains(&title) {
                return false;
            }
            seen_ids.insert(entry.document.id.clone());
            seen_titles.insert(title);
            true
        });
    }

    /// Enforce the whole-block character budget, dropping from the end.
    /// Entries are tier-major, so the end is the lowest-priority material.
    /// An oversize leading entry is clipped rather than dropped, so the
    /// highest-priority evidence always reaches the LLM.
    fn truncate_to_budget(&self, entries: &mut Vec<ContextEntry>) {
        let budget = self.config.max_context_chars;
        let mut total = 0usize;
        let mut keep = entries.len();
        for (idx, entry) in entries.iter_mut().enumerate() {
            let len = entry.document.title.len() + entry.document.content.len();
            if total + len > budget {
                if idx == 0 {
                    let room = budget.saturating_sub(entry.document.title.len());
                    clip_at_char_boundary(&mut entry.document.content, room);
                    keep = 1;
                } else {
                    keep = idx;
                }
                break;
            }
            total += len;
        }
        if keep < entries.len() {
            tracing::debug!(
                dropped = entries.len() - keep,
                budget,
                "Context block trimmed to character budget"
            );
            entries.truncate(keep);
        }
    }
}

/// Truncate to at most `max_bytes`, backing off to the nearest char boundary.
fn clip_at_char_boundary(content: &mut String, max_bytes: usize) {
    if content.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    content.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, SearchResult};

    fn result(id: &str, title: &str, score: f64, rank: usize) -> SearchResult {
        SearchResult {
            document: Document::new(id, title, format!("content for {}", id)),
            score,
            rank,
        }
    }

    fn source(kind: SourceKind, results: Vec<SearchResult>, best: f64) -> SourceResults {
        SourceResults { kind, results, best_similarity: best }
    }

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(ContextConfig::default())
    }

    #[test]
    fn test_harvested_tier_precedes_higher_scoring_kb() {
        let per_source = vec![
            source(
                SourceKind::KnowledgeBase,
                vec![result("kb1", "VPN article", 0.95, 1)],
                0.95,
            ),
            source(
                SourceKind::HarvestedSolutions,
                vec![result("hs1", "Resolved ticket: VPN", 0.40, 1)],
                0.40,
            ),
        ];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::Network);
        assert_eq!(block.entries[0].document.id, "hs1");
        assert_eq!(block.entries[1].document.id, "kb1");
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let a = vec![
            source(SourceKind::Wiki, vec![result("w1", "Wiki page", 0.5, 1)], 0.5),
            source(SourceKind::KnowledgeBase, vec![result("k1", "KB page", 0.7, 1)], 0.7),
        ];
        let b = vec![a[1].clone(), a[0].clone()];

        let asm = assembler();
        let order_a: Vec<String> = asm
            .assemble(&a, QueryIntent::HowTo, QueryDomain::General)
            .sources_used;
        let order_b: Vec<String> = asm
            .assemble(&b, QueryIntent::HowTo, QueryDomain::General)
            .sources_used;
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn test_intent_weighting_reorders_within_tier() {
        // Two ticket forms in the same tier; weights scale both equally, so
        // ordering within the tier still follows raw score. The weight shows
        // up against other tiers instead, checked via sources_used ordering
        // with a KB source present.
        let per_source = vec![
            source(
                SourceKind::ContextForms,
                vec![result("f1", "Alta usuario SAP", 0.30, 1)],
                0.30,
            ),
            source(
                SourceKind::Wiki,
                vec![result("w1", "SAP wiki", 0.32, 1)],
                0.32,
            ),
        ];

        let block =
            assembler().assemble(&per_source, QueryIntent::TicketRequest, QueryDomain::Sap);
        // Forms tier precedes wiki tier by priority anyway; the weighted
        // score must also reflect the 2.5x boost.
        let form = block.entries.iter().find(|e| e.document.id == "f1").unwrap();
        let wiki = block.entries.iter().find(|e| e.document.id == "w1").unwrap();
        assert!(form.score > wiki.score);
    }

    #[test]
    fn test_cross_tier_dedup_keeps_highest_priority() {
        let per_source = vec![
            source(
                SourceKind::HarvestedSolutions,
                vec![result("x", "Shared doc", 0.2, 1)],
                0.2,
            ),
            source(SourceKind::KnowledgeBase, vec![result("x", "Shared doc", 0.9, 1)], 0.9),
        ];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        assert_eq!(block.entries.len(), 1);
        assert_eq!(block.entries[0].tier, SourceKind::HarvestedSolutions);
    }

    #[test]
    fn test_title_dedup_after_normalization() {
        let per_source = vec![
            source(SourceKind::Wiki, vec![result("w1", "Conexión VPN", 0.5, 1)], 0.5),
            source(SourceKind::KnowledgeBase, vec![result("k1", "conexion vpn", 0.5, 1)], 0.5),
        ];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        assert_eq!(block.entries.len(), 1);
        assert_eq!(block.entries[0].document.id, "w1");
    }

    #[test]
    fn test_per_tier_cap() {
        let results: Vec<SearchResult> = (0..10)
            .map(|i| result(&format!("k{}", i), &format!("KB {}", i), 1.0 - i as f64 * 0.05, i + 1))
            .collect();
        let per_source = vec![source(SourceKind::KnowledgeBase, results, 0.9)];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        assert_eq!(block.entries.len(), ContextConfig::default().max_per_tier);
    }

    #[test]
    fn test_char_budget_drops_lowest_priority_first() {
        let big = "x".repeat(6000);
        let per_source = vec![
            source(
                SourceKind::HarvestedSolutions,
                vec![SearchResult {
                    document: Document::new("hs1", "Solution", big.clone()),
                    score: 0.5,
                    rank: 1,
                }],
                0.5,
            ),
            source(
                SourceKind::KnowledgeBase,
                vec![SearchResult {
                    document: Document::new("kb1", "Article", big),
                    score: 0.9,
                    rank: 1,
                }],
                0.9,
            ),
        ];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        assert_eq!(block.entries.len(), 1);
        assert_eq!(block.entries[0].document.id, "hs1");
    }

    #[test]
    fn test_oversize_top_entry_is_clipped_not_dropped() {
        // Multi-byte content over twice the budget; clipping must land on a
        // char boundary and the entry must survive.
        let big = "é".repeat(6000);
        let per_source = vec![source(
            SourceKind::HarvestedSolutions,
            vec![SearchResult {
                document: Document::new("hs1", "Solutions", big),
                score: 0.5,
                rank: 1,
            }],
            0.5,
        )];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        assert_eq!(block.entries.len(), 1);
        let doc = &block.entries[0].document;
        assert!(doc.title.len() + doc.content.len() <= ContextConfig::default().max_context_chars);
        assert!(!doc.content.is_empty());
        assert!(doc.content.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_domain_exclusion_for_ticket_forms() {
        let mut sap_form = result("f_sap", "Alta SAP", 0.9, 1);
        sap_form.document.category = Some("SAP".into());
        let mut net_form = result("f_net", "Alta VPN", 0.5, 2);
        net_form.document.category = Some("Network".into());

        let per_source = vec![source(SourceKind::ContextForms, vec![sap_form, net_form], 0.9)];

        let block = assembler().assemble(
            &per_source,
            QueryIntent::TicketRequest,
            QueryDomain::Network,
        );
        let ids: Vec<&str> = block.entries.iter().map(|e| e.document.id.as_str()).collect();
        assert_eq!(ids, vec!["f_net"]);
    }

    #[test]
    fn test_sources_used_matches_entry_order() {
        let per_source = vec![
            source(SourceKind::Wiki, vec![result("w1", "A", 0.5, 1)], 0.5),
            source(SourceKind::KnowledgeBase, vec![result("k1", "B", 0.6, 1)], 0.6),
        ];

        let block = assembler().assemble(&per_source, QueryIntent::General, QueryDomain::General);
        let ids: Vec<String> =
            block.entries.iter().map(|e| e.document.id.clone()).collect();
        assert_eq!(block.sources_used, ids);
    }
}
