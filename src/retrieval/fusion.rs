//! Reciprocal Rank Fusion for combining lexical and dense candidate lists

use crate::retrieval::{Candidate, FusedCandidate};
use ahash::AHashMap;

/// Merge two ranked candidate lists with Reciprocal Rank Fusion.
///
/// RRF formula: score(id) = sum over contributing lists of `1 / (k + rank)`,
/// with 1-indexed ranks. Candidates present in only one list still receive a
/// score from that list alone, so an empty side degrades gracefully.
///
/// Output is sorted by fused score descending; ties break by lexical rank if
/// present, else dense rank, else product id, which keeps the ordering fully
/// deterministic and symmetric in the input lists.
pub fn reciprocal_rank_fusion(
    lexical: &[Candidate],
    dense: &[Candidate],
    k: f32,
) -> Vec<FusedCandidate> {
    let mut fused: AHashMap<u32, FusedCandidate> = AHashMap::new();

    for (index, candidate) in lexical.iter().enumerate() {
        let rank = index + 1;
        let entry = fused
            .entry(candidate.product_id)
            .or_insert_with(|| FusedCandidate {
                product_id: candidate.product_id,
                fused_score: 0.0,
                lexical_rank: None,
                dense_rank: None,
            });
        entry.lexical_rank = Some(rank);
        entry.fused_score += 1.0 / (k + rank as f32);
    }

    for (index, candidate) in dense.iter().enumerate() {
        let rank = index + 1;
        let entry = fused
            .entry(candidate.product_id)
            .or_insert_with(|| FusedCandidate {
                product_id: candidate.product_id,
                fused_score: 0.0,
                lexical_rank: None,
                dense_rank: None,
            });
        entry.dense_rank = Some(rank);
        entry.fused_score += 1.0 / (k + rank as f32);
    }

    let mut results: Vec<FusedCandidate> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| tie_break_rank(a).cmp(&tie_break_rank(b)))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });

    results
}

// Lexical rank if present, else dense rank; a lexical presence outranks a
// dense-only presence at the same rank.
fn tie_break_rank(candidate: &FusedCandidate) -> (usize, u8) {
    match (candidate.lexical_rank, candidate.dense_rank) {
        (Some(rank), _) => (rank, 0),
        (None, Some(rank)) => (rank, 1),
        (None, None) => (usize::MAX, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::CandidateSource;

    fn candidates(source: CandidateSource, ids: &[u32]) -> Vec<Candidate> {
        ids.iter()
            .enumerate()
            .map(|(i, &id)| Candidate {
                product_id: id,
                score: 1.0 - i as f32 * 0.1,
                source,
            })
            .collect()
    }

    #[test]
    fn shared_candidates_rank_highest() {
        let lexical = candidates(CandidateSource::Lexical, &[1, 2, 3]);
        let dense = candidates(CandidateSource::Dense, &[2, 1, 4]);

        let fused = reciprocal_rank_fusion(&lexical, &dense, 60.0);

        assert_eq!(fused.len(), 4);
        // 1 and 2 appear in both lists and must outrank 3 and 4
        assert!(fused[0].product_id == 1 || fused[0].product_id == 2);
        assert!(fused[1].product_id == 1 || fused[1].product_id == 2);
    }

    #[test]
    fn fusion_is_symmetric_up_to_tie_break() {
        let a = candidates(CandidateSource::Lexical, &[1, 2, 3]);
        let b = candidates(CandidateSource::Dense, &[3, 4, 5]);

        let forward = reciprocal_rank_fusion(&a, &b, 60.0);
        let backward = reciprocal_rank_fusion(&b, &a, 60.0);

        let forward_scores: Vec<(u32, f32)> = forward
            .iter()
            .map(|c| (c.product_id, c.fused_score))
            .collect();
        for (id, score) in forward_scores {
            let other = backward.iter().find(|c| c.product_id == id).unwrap();
            assert!((other.fused_score - score).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn dual_presence_beats_single_presence() {
        // Product 7 holds rank 2 in both lists; product 9 holds rank 1 in
        // one list only. RRF monotonicity: 7 must score strictly higher than
        // any rank-2-single candidate and the dual contribution shows.
        let lexical = candidates(CandidateSource::Lexical, &[9, 7]);
        let dense = candidates(CandidateSource::Dense, &[8, 7]);

        let fused = reciprocal_rank_fusion(&lexical, &dense, 60.0);
        let score_of = |id: u32| {
            fused
                .iter()
                .find(|c| c.product_id == id)
                .unwrap()
                .fused_score
        };

        assert!(score_of(7) > score_of(9));
        assert!(score_of(7) > score_of(8));
    }

    #[test]
    fn single_list_still_scores() {
        let lexical = candidates(CandidateSource::Lexical, &[1, 2]);
        let fused = reciprocal_rank_fusion(&lexical, &[], 60.0);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].product_id, 1);
        assert_eq!(fused[0].lexical_rank, Some(1));
        assert!(fused[0].dense_rank.is_none());
    }

    #[test]
    fn empty_inputs_fuse_to_empty() {
        assert!(reciprocal_rank_fusion(&[], &[], 60.0).is_empty());
    }

    #[test]
    fn ties_break_by_lexical_rank_then_id() {
        // Two candidates each only in one list at the same rank: equal RRF
        // scores, lexical side wins
        let lexical = candidates(CandidateSource::Lexical, &[5]);
        let dense = candidates(CandidateSource::Dense, &[3]);

        let fused = reciprocal_rank_fusion(&lexical, &dense, 60.0);
        assert_eq!(fused[0].product_id, 5);
        assert_eq!(fused[1].product_id, 3);
    }
}
