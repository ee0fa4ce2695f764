//! Upper-bound-guided top-k pruning over fully materialized posting lists
//! (§4.10) — used when postings come from an in-memory batch rather than
//! segment files.

use crate::config::Bm25Params;
use crate::search::Hit;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// One query term's fully materialized posting list plus its corpus-wide
/// document frequency (used for the upper-bound IDF, independent of how
/// many of its postings happen to be present in `postings`).
pub struct WandTerm {
    pub postings: Vec<(u32, u32)>,
    pub df: u32,
}

struct FloatOrd(f32);
impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for FloatOrd {}
impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Runs WAND over `terms` (one entry per resolved query term), scoring
/// against `doc_lengths`/`avgdl`/`total_docs`, and returns the top `top_k`
/// hits with `book_ids` resolved via `book_id_of`.
pub fn search(
    terms: &[WandTerm],
    doc_lengths: &HashMap<u32, u32>,
    avgdl: f32,
    total_docs: u32,
    top_k: usize,
    book_id_of: impl Fn(u32) -> String,
) -> Vec<Hit> {
    if terms.is_empty() || top_k == 0 || avgdl == 0.0 {
        return Vec::new();
    }
    let params = Bm25Params::segment_default();
    let n = total_docs as f32;

    // Per-term IDF and BM25 upper bound (tf -> infinity, dl -> 0).
    let mut ordered: Vec<&WandTerm> = terms.iter().collect();
    ordered.sort_unstable_by_key(|t| t.postings.len());

    let upper_bound = |term: &WandTerm| -> f32 {
        let df = term.df.max(1) as f32;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
        idf * (params.k1 + 1.0)
    };
    let idf_of = |term: &WandTerm| -> f32 {
        let df = term.df.max(1) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    };

    // Candidate collection: intersect if it retains >= 2*top_k candidates,
    // else union (§4.10).
    let mut candidate_sets: Vec<HashSet<u32>> = ordered
        .iter()
        .map(|t| t.postings.iter().map(|(doc_id, _)| *doc_id).collect())
        .collect();

    let intersection: HashSet<u32> = candidate_sets
        .iter()
        .skip(1)
        .fold(candidate_sets.first().cloned().unwrap_or_default(), |acc, set| {
            acc.intersection(set).copied().collect()
        });

    let candidates: HashSet<u32> = if intersection.len() >= 2 * top_k {
        intersection
    } else {
        candidate_sets.drain(..).flatten().collect()
    };

    // Per-candidate upper bound: sum of the upper bounds of terms that
    // actually contain it.
    let mut candidate_bounds: Vec<(u32, f32)> = candidates
        .into_iter()
        .map(|doc_id| {
            let bound: f32 = ordered
                .iter()
                .filter(|t| t.postings.binary_search_by_key(&doc_id, |(d, _)| *d).is_ok())
                .map(|t| upper_bound(t))
                .sum();
            (doc_id, bound)
        })
        .collect();
    candidate_bounds.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut heap: BinaryHeap<Reverse<(FloatOrd, u32)>> = BinaryHeap::with_capacity(top_k + 1);

    for (doc_id, bound) in candidate_bounds {
        if heap.len() >= top_k {
            if let Some(&Reverse((FloatOrd(min_score), _))) = heap.peek() {
                if bound <= min_score {
                    break;
                }
            }
        }

        let dl = *doc_lengths.get(&doc_id).unwrap_or(&0) as f32;
        let mut score = 0.0f32;
        for term in &ordered {
            let Ok(pos) = term.postings.binary_search_by_key(&doc_id, |(d, _)| *d) else { continue };
            let tf = term.postings[pos].1 as f32;
            let idf = idf_of(term);
            let denom = tf + params.k1 * (1.0 - params.b + params.b * dl / avgdl);
            score += idf * tf * (params.k1 + 1.0) / denom;
        }

        if heap.len() < top_k {
            heap.push(Reverse((FloatOrd(score), doc_id)));
        } else if let Some(&Reverse((FloatOrd(min_score), _))) = heap.peek() {
            if score > min_score {
                heap.pop();
                heap.push(Reverse((FloatOrd(score), doc_id)));
            }
        }
    }

    let mut hits: Vec<Hit> = heap
        .into_iter()
        .map(|Reverse((FloatOrd(score), doc_id))| Hit { doc_id, score, book_id: book_id_of(doc_id) })
        .collect();
    hits.sort_unstable_by(crate::search::cmp_hit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wand_matches_exhaustive_scoring_on_small_corpus() {
        // "the" is common (df 4), "fox" is rare (df 2): doc 1 and 3 have
        // both and should outrank doc 0 and 2, which only have "the".
        let the = WandTerm { postings: vec![(0, 1), (1, 1), (2, 1), (3, 1)], df: 4 };
        let fox = WandTerm { postings: vec![(1, 2), (3, 1)], df: 2 };

        let mut lengths = HashMap::new();
        for i in 0..4u32 {
            lengths.insert(i, 5);
        }

        let hits = search(&[the, fox], &lengths, 5.0, 4, 2, |id| format!("doc{id}"));
        assert_eq!(hits.len(), 2);
        let ids: HashSet<u32> = hits.iter().map(|h| h.doc_id).collect();
        assert_eq!(ids, HashSet::from([1, 3]));
    }

    #[test]
    fn empty_terms_yield_no_hits() {
        let lengths = HashMap::new();
        assert!(search(&[], &lengths, 1.0, 0, 5, |id| id.to_string()).is_empty());
    }
}
