//! Weighted fusion of keyword and vector result lists.

use std::collections::HashMap;

use specrag_core::{Fragment, ScoredFragment};

/// Merge keyword hits and vector hits into one ranked list.
///
/// Keyword hits contribute `score * alpha`. The vector hit at 0-based
/// position `i` contributes `(1 - alpha) / (i + 1)`, added to the keyword
/// entry with the same identifier or inserted as a new entry built from the
/// vector fragment. Vector fragments without an `id` are identified as
/// `vector_<i>`.
///
/// # Arguments
/// * `keyword` - Keyword hits, carrying their native scores
/// * `vector` - Vector hits in source order
/// * `alpha` - Keyword weight in `[0, 1]`
/// * `k` - Maximum number of results to return
///
/// # Returns
/// Entries sorted by descending score, ties by identifier ascending.
pub fn hybrid_fusion(
    keyword: Vec<ScoredFragment>,
    vector: Vec<Fragment>,
    alpha: f32,
    k: usize,
) -> Vec<ScoredFragment> {
    let mut merged: Vec<ScoredFragment> = Vec::with_capacity(keyword.len() + vector.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in keyword {
        let entry = ScoredFragment {
            score: hit.score * alpha,
            ..hit
        };
        // A repeated keyword id replaces the earlier entry.
        match positions.get(&entry.id) {
            Some(&pos) => merged[pos] = entry,
            None => {
                positions.insert(entry.id.clone(), merged.len());
                merged.push(entry);
            }
        }
    }

    for (rank, fragment) in vector.into_iter().enumerate() {
        let id = fragment
            .id()
            .map(String::from)
            .unwrap_or_else(|| format!("vector_{}", rank));
        let score = (1.0 - alpha) * (1.0 / (rank as f32 + 1.0));

        match positions.get(&id) {
            Some(&pos) => merged[pos].score += score,
            None => {
                positions.insert(id.clone(), merged.len());
                merged.push(ScoredFragment {
                    id,
                    score,
                    fragment,
                });
            }
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    merged.truncate(k);

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(id: &str, score: f32) -> ScoredFragment {
        ScoredFragment {
            id: id.to_string(),
            score,
            fragment: Fragment::new(format!("keyword {}", id)).with_meta("id", id),
        }
    }

    fn vector(id: &str) -> Fragment {
        Fragment::new(format!("vector {}", id)).with_meta("id", id)
    }

    fn ids(results: &[ScoredFragment]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_shared_id_scores_are_summed() {
        let fused = hybrid_fusion(
            vec![keyword("a", 2.0), keyword("b", 1.0)],
            vec![vector("b"), vector("c")],
            0.5,
            10,
        );

        assert_eq!(fused.len(), 3);
        let b = fused.iter().find(|r| r.id == "b").unwrap();
        // 1.0 * 0.5 + 0.5 * 1/1
        assert!((b.score - 1.0).abs() < 1e-6);
        // The keyword copy of a shared document wins.
        assert_eq!(b.fragment.content, "keyword b");
        assert_eq!(fused.iter().filter(|r| r.id == "b").count(), 1);

        let c = fused.iter().find(|r| r.id == "c").unwrap();
        assert!((c.score - 0.25).abs() < 1e-6);
        assert_eq!(c.fragment.content, "vector c");
    }

    #[test]
    fn test_sorted_and_truncated() {
        let fused = hybrid_fusion(
            vec![keyword("a", 0.1), keyword("b", 3.0), keyword("c", 1.5)],
            vec![vector("d"), vector("a"), vector("e")],
            0.3,
            4,
        );

        assert_eq!(fused.len(), 4);
        for pair in fused.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_alpha_one_is_keyword_ranking() {
        let fused = hybrid_fusion(
            vec![keyword("a", 3.0), keyword("b", 2.0), keyword("c", 1.0)],
            vec![vector("c"), vector("z")],
            1.0,
            10,
        );

        assert_eq!(&ids(&fused)[..3], &["a", "b", "c"]);
        assert_eq!(fused[3].id, "z");
        assert_eq!(fused[3].score, 0.0);
    }

    #[test]
    fn test_alpha_zero_is_vector_ranking() {
        let fused = hybrid_fusion(
            vec![keyword("a", 30.0), keyword("y", 20.0)],
            vec![vector("c"), vector("b"), vector("a")],
            0.0,
            10,
        );

        assert_eq!(&ids(&fused)[..3], &["c", "b", "a"]);
        assert_eq!(fused[3].id, "y");
    }

    #[test]
    fn test_ties_break_on_id() {
        let fused = hybrid_fusion(
            vec![keyword("m", 1.0), keyword("b", 1.0), keyword("x", 1.0)],
            Vec::new(),
            0.5,
            10,
        );
        assert_eq!(ids(&fused), vec!["b", "m", "x"]);
    }

    #[test]
    fn test_vector_without_id() {
        let fused = hybrid_fusion(
            Vec::new(),
            vec![Fragment::new("first"), Fragment::new("second")],
            0.5,
            10,
        );
        assert_eq!(ids(&fused), vec!["vector_0", "vector_1"]);
    }

    #[test]
    fn test_zero_k() {
        let fused = hybrid_fusion(vec![keyword("a", 1.0)], vec![vector("b")], 0.5, 0);
        assert!(fused.is_empty());
    }
}
