//! Uncompressed inverted index for documents not yet sealed into a segment.

use crate::config::Bm25Params;
use std::collections::HashMap;

/// A document as held in the RAM index: its opaque metadata blob and
/// token length. There is no caller-supplied `book_id` at this layer —
/// the real-time indexer's `add_document` contract takes only
/// `(content, metadata)` (§6); callers needing a stable external key
/// encode it in `metadata` themselves.
#[derive(Debug, Clone)]
pub struct Document {
    pub metadata: String,
    pub length: u32,
}

/// In-memory mirror of one segment's worth of postings, scored with its
/// own BM25 constants (§4.6). `next_doc_id` survives `clear()` so ids
/// handed out before a flush never collide with the segment the flush
/// produces.
pub struct RamIndex {
    postings: HashMap<String, Vec<(u32, u32)>>,
    documents: HashMap<u32, Document>,
    total_length: u64,
    next_doc_id: u32,
}

impl RamIndex {
    pub fn new(next_doc_id: u32) -> Self {
        Self {
            postings: HashMap::new(),
            documents: HashMap::new(),
            total_length: 0,
            next_doc_id,
        }
    }

    pub fn num_docs(&self) -> u32 {
        self.documents.len() as u32
    }

    pub fn next_doc_id(&self) -> u32 {
        self.next_doc_id
    }

    fn avgdl(&self) -> f32 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.documents.len() as f32
        }
    }

    pub fn document(&self, doc_id: u32) -> Option<&Document> {
        self.documents.get(&doc_id)
    }

    pub fn documents(&self) -> impl Iterator<Item = (&u32, &Document)> {
        self.documents.iter()
    }

    /// Inverts `postings` back into one `term -> tf` map per `doc_id`, for
    /// sealing the current RAM contents into a segment on flush.
    pub fn term_freqs_by_doc(&self) -> HashMap<u32, HashMap<String, u32>> {
        let mut by_doc: HashMap<u32, HashMap<String, u32>> = HashMap::new();
        for (term, postings) in &self.postings {
            for &(doc_id, tf) in postings {
                by_doc.entry(doc_id).or_default().insert(term.clone(), tf);
            }
        }
        by_doc
    }

    /// Inserts one document's already-analyzed term frequencies, assigning
    /// it the next `doc_id`.
    pub fn insert(&mut self, metadata: String, term_freqs: HashMap<String, u32>, length: u32) -> u32 {
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        self.total_length += length as u64;
        for (term, tf) in term_freqs {
            self.postings.entry(term).or_default().push((doc_id, tf));
        }
        self.documents.insert(doc_id, Document { metadata, length });
        doc_id
    }

    /// Drops all documents and postings but keeps `next_doc_id` intact.
    pub fn clear(&mut self) {
        self.postings.clear();
        self.documents.clear();
        self.total_length = 0;
    }

    /// Scores every document containing at least one query term, using
    /// this index's own `num_docs`/`avgdl` (§4.6).
    pub fn search(&self, query_terms: &[String]) -> HashMap<u32, f32> {
        let mut scores = HashMap::new();
        if query_terms.is_empty() || self.documents.is_empty() {
            return scores;
        }
        let params = Bm25Params::ram_default();
        let n = self.documents.len() as f32;
        let avgdl = self.avgdl();

        for term in query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(doc_id, tf) in postings {
                let dl = self.documents.get(&doc_id).map(|d| d.length as f32).unwrap_or(0.0);
                let tf = tf as f32;
                let denom = tf + params.k1 * (1.0 - params.b + params.b * dl / avgdl);
                *scores.entry(doc_id).or_insert(0.0) += idf * tf * (params.k1 + 1.0) / denom;
            }
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freqs(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs.iter().map(|(t, f)| (t.to_string(), *f)).collect()
    }

    #[test]
    fn next_doc_id_survives_clear() {
        let mut index = RamIndex::new(10);
        let id = index.insert("".into(), freqs(&[("fox", 1)]), 1);
        assert_eq!(id, 10);
        index.clear();
        assert_eq!(index.next_doc_id(), 11);
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn search_ranks_documents_with_more_matching_terms_higher() {
        let mut index = RamIndex::new(0);
        index.insert("".into(), freqs(&[("quick", 1), ("fox", 1)]), 2);
        index.insert("".into(), freqs(&[("lazy", 1), ("dog", 1)]), 2);

        let scores = index.search(&["quick".to_string(), "fox".to_string()]);
        assert!(scores.contains_key(&0));
        assert!(!scores.contains_key(&1));
    }

    #[test]
    fn empty_query_yields_no_scores() {
        let mut index = RamIndex::new(0);
        index.insert("".into(), freqs(&[("fox", 1)]), 1);
        assert!(index.search(&[]).is_empty());
    }

    #[test]
    fn num_documents_after_100_inserts_matches_count() {
        let mut index = RamIndex::new(0);
        for i in 0..100 {
            index.insert(format!("meta-{i}"), freqs(&[("word", 1)]), 1);
        }
        assert_eq!(index.num_docs(), 100);
    }
}
