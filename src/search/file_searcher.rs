//! Multi-segment BM25 search with fuzzy term expansion (§4.9).

use crate::analyzer::analyze;
use crate::config::{Bm25Params, StemmerLanguage};
use crate::directory::FsDirectory;
use crate::error::Result;
use crate::index::Index;
use crate::search::Hit;
use crate::segment::reader::fuzzy_distance_for;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub struct FileSearcher {
    index: Index,
    language: StemmerLanguage,
    stopwords: HashSet<String>,
}

impl FileSearcher {
    pub fn open(index_dir: impl AsRef<Path>, language: StemmerLanguage, stopwords: Vec<String>) -> Result<Self> {
        let dir = FsDirectory::new(index_dir.as_ref())?;
        let index = Index::open(&dir)?;
        Ok(Self { index, language, stopwords: stopwords.into_iter().collect() })
    }

    pub fn total_docs(&self) -> u32 {
        self.index.total_docs
    }

    /// Runs the full algorithm: analyze, resolve, corpus-wide IDF, stream
    /// and score, then select and order the top `top_k` (§4.9).
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        let tokens: Vec<String> = analyze(query, self.language)
            .into_iter()
            .filter(|t| !self.stopwords.contains(t))
            .collect();
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let hits: Vec<Hit> = score_against_index(&self.index, &tokens)?
            .into_iter()
            .map(|(doc_id, (score, book_id))| Hit { doc_id, score, book_id })
            .collect();
        Ok(quickselect_top_k(hits, top_k))
    }
}

/// Scores every segment in `index` against already-analyzed, already
/// stopword-filtered `tokens`, returning `global_doc_id -> (score,
/// book_id)`. Shared between [`FileSearcher`] and the real-time indexer,
/// which needs the full map to merge against RAM scores before picking a
/// global top-k.
pub(crate) fn score_against_index(index: &Index, tokens: &[String]) -> Result<HashMap<u32, (f32, String)>> {
    let mut accumulator: HashMap<u32, (f32, String)> = HashMap::new();
    if tokens.is_empty() || index.segments.is_empty() {
        return Ok(accumulator);
    }

    let params = Bm25Params::segment_default();
    let n = index.total_docs as f32;
    let avgdl = index.avgdl;

    for token in tokens {
        let distance = fuzzy_distance_for(token);
        let mut resolved: Vec<(usize, String, u32)> = Vec::new();
        for (idx, segment) in index.segments.iter().enumerate() {
            if let Ok(Some(df)) = segment.get_df(token) {
                resolved.push((idx, token.clone(), df));
                continue;
            }
            for candidate in segment.fuzzy_terms(token, distance) {
                if let Ok(Some(df)) = segment.get_df(&candidate) {
                    resolved.push((idx, candidate, df));
                }
            }
        }
        let total_df: u32 = resolved.iter().map(|(_, _, df)| *df).sum();
        if total_df == 0 {
            continue;
        }
        let idf = ((n - total_df as f32 + 0.5) / (total_df as f32 + 0.5) + 1.0).ln();

        for (segment_idx, term, _df) in &resolved {
            let segment = &index.segments[*segment_idx];
            if let Err(e) = score_segment_postings(segment, term, idf, &params, avgdl, &mut accumulator) {
                tracing::warn!(segment = segment.dir_name.as_str(), term, error = %e, "skipping corrupt segment during search");
            }
        }
    }
    Ok(accumulator)
}

/// Streams one term's postings in one segment into `accumulator`. Pulled
/// out of [`score_against_index`] so a single corrupt posting block aborts
/// only this (segment, term) pair — the caller logs the error and moves on
/// to the next segment rather than failing the whole query (§7).
fn score_segment_postings(
    segment: &crate::segment::reader::SegmentReader,
    term: &str,
    idf: f32,
    params: &Bm25Params,
    avgdl: f32,
    accumulator: &mut HashMap<u32, (f32, String)>,
) -> Result<()> {
    let Some(postings) = segment.get_postings(term)? else { return Ok(()) };
    for posting in postings {
        let (local_doc_id, tf) = posting?;
        let dl = segment.doc_length(local_doc_id)? as f32;
        let tf = tf as f32;
        let denom = tf + params.k1 * (1.0 - params.b + params.b * dl / avgdl);
        let contribution = idf * tf * (params.k1 + 1.0) / denom;
        let global_doc_id = segment.meta.base_doc_id + local_doc_id;
        let book_id = segment.book_id(local_doc_id)?.to_string();
        let entry = accumulator.entry(global_doc_id).or_insert((0.0, book_id));
        entry.0 += contribution;
    }
    Ok(())
}

/// Partial selection at `top_k` followed by a sort of just that prefix
/// (§4.9 step 5). Uses the comparator shared with [`crate::search::wand`]
/// and [`crate::realtime`] so all three searchers order results identically.
fn quickselect_top_k(mut hits: Vec<Hit>, top_k: usize) -> Vec<Hit> {
    if hits.len() > top_k {
        hits.select_nth_unstable_by(top_k - 1, crate::search::cmp_hit);
        hits.truncate(top_k);
    }
    hits.sort_unstable_by(crate::search::cmp_hit);
    hits
}
