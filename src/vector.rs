//! Cosine similarity primitives
//!
//! The numeric kernel shared by the semantic retrieval pass and the semantic
//! cache tier. Malformed input (empty, mismatched length, zero magnitude) is
//! defined to yield similarity 0.0, never an error, so degraded documents
//! simply drop out of semantic rankings instead of aborting a query.

use rayon::prelude::*;

/// Candidate count above which the batch computation fans out across cores.
/// Below this, thread coordination costs more than it saves. The parallel
/// and sequential paths produce identical output.
pub const PARALLEL_THRESHOLD: usize = 100;

/// Cosine similarity of two vectors, in [-1, 1].
///
/// Returns 0.0 when either vector is empty, the lengths differ, or either
/// has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score every candidate against the query and return the best matches.
///
/// Results are sorted by score descending; equal scores break ties by the
/// original candidate index ascending, so the ordering is fully
/// deterministic. Candidates scoring below `min_similarity` are dropped
/// before truncation to `top_k`.
pub fn batch_cosine_similarity(
    query: &[f32],
    candidates: &[Vec<f32>],
    top_k: usize,
    min_similarity: f64,
) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = if candidates.len() >= PARALLEL_THRESHOLD {
        candidates
            .par_iter()
            .enumerate()
            .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
            .collect()
    } else {
        candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
            .collect()
    };

    scored.retain(|(_, score)| *score >= min_similarity);
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let v = vec![0.3, -0.5, 0.8, 0.1];
        let score = cosine_similarity(&v, &v);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_opposite_vectors_score_minus_one() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        let score = cosine_similarity(&a, &b);
        assert!((score + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_hold_for_arbitrary_vectors() {
        let a = vec![0.7, -12.5, 3.3, 0.004, 9.1];
        let b = vec![-4.2, 0.8, 55.0, -0.1, 2.2];
        let score = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&score));
    }

    #[test]
    fn test_degenerate_inputs_yield_zero() {
        assert_eq!(cosine_similarity(&[], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_batch_sorted_and_truncated() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            vec![0.0, 1.0],  // orthogonal, 0.0
            vec![1.0, 0.0],  // identical, 1.0
            vec![1.0, 1.0],  // ~0.707
            vec![-1.0, 0.0], // opposite, -1.0
        ];

        let results = batch_cosine_similarity(&query, &candidates, 2, 0.0);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 2);
    }

    #[test]
    fn test_batch_min_similarity_filter() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let results = batch_cosine_similarity(&query, &candidates, 10, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn test_batch_ties_break_by_index() {
        let query = vec![1.0, 0.0];
        // Same direction, different magnitude: identical cosine scores.
        let candidates = vec![vec![2.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]];
        let results = batch_cosine_similarity(&query, &candidates, 3, 0.0);
        let order: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        // Enough candidates to cross the parallel threshold.
        let query: Vec<f32> = (0..8).map(|i| (i as f32).sin()).collect();
        let candidates: Vec<Vec<f32>> = (0..PARALLEL_THRESHOLD + 50)
            .map(|c| (0..8).map(|i| ((c * 7 + i) as f32).cos()).collect())
            .collect();

        let parallel = batch_cosine_similarity(&query, &candidates, 20, -1.0);

        let mut sequential: Vec<(usize, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(idx, c)| (idx, cosine_similarity(&query, c)))
            .collect();
        sequential.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        sequential.truncate(20);

        assert_eq!(parallel, sequential);
    }
}
