//! Deduplication and ranking of numeric candidates

use std::collections::HashMap;

use serde::Serialize;

use super::{NumericCandidate, RankedResult};

/// Default minimum confidence for a detection to be reported
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.6;

/// Output of ranking, with the entries dropped by the threshold kept for tracing
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ranking {
    /// Sorted by descending confidence, first-seen order on ties
    pub results: Vec<RankedResult>,
    /// Deduplicated entries whose confidence fell below the threshold
    pub discarded: Vec<NumericCandidate>,
}

/// Collapse duplicates by value, filter by confidence and sort.
///
/// Among duplicates the highest-confidence occurrence survives (the first
/// one on equal confidence), whether it is a forward or reversed reading.
pub fn rank_candidates(candidates: &[NumericCandidate], min_confidence: f32) -> Ranking {
    let mut index_by_value: HashMap<u32, usize> = HashMap::new();
    let mut buckets: Vec<&NumericCandidate> = Vec::new();

    for candidate in candidates {
        match index_by_value.get(&candidate.value) {
            Some(&idx) => {
                if candidate.confidence > buckets[idx].confidence {
                    buckets[idx] = candidate;
                }
            }
            None => {
                index_by_value.insert(candidate.value, buckets.len());
                buckets.push(candidate);
            }
        }
    }

    let (mut kept, discarded): (Vec<&NumericCandidate>, Vec<&NumericCandidate>) = buckets
        .into_iter()
        .partition(|c| c.confidence >= min_confidence);

    // sort_by is stable, so ties keep first-seen order
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ranking {
        results: kept
            .into_iter()
            .map(|c| RankedResult {
                value: c.value,
                confidence: c.confidence,
                origin_region: c.region.clone(),
            })
            .collect(),
        discarded: discarded.into_iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Region;

    fn candidate(value: u32, confidence: f32) -> NumericCandidate {
        NumericCandidate {
            value,
            digit_string: value.to_string(),
            confidence,
            source_text: value.to_string(),
            region: Region::rect(0.0, 0.0, 10.0, 10.0),
            is_digit_reversed: false,
        }
    }

    fn values(ranking: &Ranking) -> Vec<u32> {
        ranking.results.iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_duplicates_keep_max_confidence() {
        let ranking = rank_candidates(&[candidate(42, 0.5), candidate(42, 0.9)], 0.6);
        assert_eq!(ranking.results.len(), 1);
        assert_eq!(ranking.results[0].value, 42);
        assert!((ranking.results[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!(ranking.discarded.is_empty());
    }

    #[test]
    fn test_reversed_duplicate_collapses() {
        let mut reversed = candidate(71, 0.95);
        reversed.is_digit_reversed = true;
        let ranking = rank_candidates(&[candidate(71, 0.7), reversed], 0.6);
        assert_eq!(values(&ranking), vec![71]);
        assert!((ranking.results[0].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn test_below_threshold_filtered() {
        let ranking = rank_candidates(&[candidate(42, 0.55), candidate(17, 0.8)], 0.6);
        assert_eq!(values(&ranking), vec![17]);
        assert_eq!(ranking.discarded.len(), 1);
        assert_eq!(ranking.discarded[0].value, 42);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let ranking = rank_candidates(&[candidate(42, 0.6)], 0.6);
        assert_eq!(values(&ranking), vec![42]);
    }

    #[test]
    fn test_sorted_descending_stable_on_ties() {
        let ranking = rank_candidates(
            &[
                candidate(11, 0.7),
                candidate(22, 0.9),
                candidate(33, 0.7),
                candidate(44, 0.8),
            ],
            0.6,
        );
        assert_eq!(values(&ranking), vec![22, 44, 11, 33]);
    }

    #[test]
    fn test_tie_position_follows_first_occurrence() {
        // 33 is seen first, then upgraded to 0.7 by a later duplicate
        let ranking = rank_candidates(
            &[candidate(33, 0.65), candidate(11, 0.7), candidate(33, 0.7)],
            0.6,
        );
        assert_eq!(values(&ranking), vec![33, 11]);
    }

    #[test]
    fn test_empty() {
        let ranking = rank_candidates(&[], DEFAULT_MIN_CONFIDENCE);
        assert!(ranking.results.is_empty());
        assert!(ranking.discarded.is_empty());
    }
}
