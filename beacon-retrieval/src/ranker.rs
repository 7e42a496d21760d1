//! Hybrid ranking: blend semantic and geographic scores, sort, truncate.

use crate::document::ScoredResult;

/// Blend a semantic and a geographic score with the configured weights.
///
/// Both inputs live in [0, 1] and the weights sum to 1.0, so the result is
/// bounded in [0, 1].
pub fn final_score(semantic_weight: f32, geographic_weight: f32, semantic: f32, geographic: f32) -> f32 {
    semantic_weight * semantic + geographic_weight * geographic
}

/// Sort results by descending final score and truncate to `k`.
///
/// The sort is stable: exact ties keep their incoming order, which is the
/// semantic candidate order, so geography never reshuffles equally-scored
/// results.
pub fn rank(mut results: Vec<ScoredResult>, k: usize) -> Vec<ScoredResult> {
    results.sort_by(|a, b| {
        b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(k);
    results
}
