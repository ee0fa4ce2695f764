//! Federates the file searcher, RAM index, and WAL under one API (§4.11).

use crate::analyzer::analyze;
use crate::config::{StemmerLanguage, WalOptions};
use crate::directory::FsDirectory;
use crate::error::Result;
use crate::index::Index;
use crate::ram_index::RamIndex;
use crate::search::file_searcher::score_against_index;
use crate::search::{select_top_k, Hit};
use crate::segment::writer::{write_segment, ProcessedChunk, ProcessedDoc};
use crate::wal::{Wal, WalRecord};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const WAL_PATH: &str = "index.wal";

/// Owns the on-disk index, the RAM index for documents added since the
/// last flush, and the WAL backing it. Lock order when both are held is
/// segment-reader (immutable, no lock needed) → `index` → `ram` (§5).
pub struct RealTimeIndexer {
    root: PathBuf,
    dir: FsDirectory,
    index: RwLock<Index>,
    ram: RwLock<RamIndex>,
    language: StemmerLanguage,
    stopwords: HashSet<String>,
    wal_options: WalOptions,
}

impl RealTimeIndexer {
    /// Opens segments, opens the WAL, and replays it into a fresh RAM
    /// index whose `next_doc_id` starts at `segments.total_docs`.
    pub fn new(
        index_dir: impl AsRef<Path>,
        language: StemmerLanguage,
        stopwords: Vec<String>,
        wal_options: WalOptions,
    ) -> Result<Self> {
        let root = index_dir.as_ref().to_path_buf();
        let dir = FsDirectory::new(&root)?;
        let index = Index::open(&dir)?;
        let mut ram = RamIndex::new(index.total_docs);

        let wal = Wal::open(&dir, WAL_PATH, wal_options);
        for record in wal.read_all()? {
            let term_freqs = term_freqs_of(&record.content, language);
            ram.insert(record.metadata, term_freqs, record.length);
        }

        Ok(Self {
            root,
            dir,
            index: RwLock::new(index),
            ram: RwLock::new(ram),
            language,
            stopwords: stopwords.into_iter().collect(),
            wal_options,
        })
    }

    fn wal(&self) -> Wal<'_, FsDirectory> {
        Wal::open(&self.dir, WAL_PATH, self.wal_options)
    }

    /// Inserts into RAM, then appends to the WAL. The document's `book_id`
    /// for search purposes is its own `doc_id` — the real-time layer's
    /// contract carries only `(content, metadata)`.
    pub fn add_document(&self, content: &str, metadata: &str) -> Result<u32> {
        let tokens = analyze(content, self.language);
        let length = tokens.len() as u32;
        let term_freqs = term_freqs_of(content, self.language);

        let mut ram = self.ram.write()?;
        let doc_id = ram.insert(metadata.to_string(), term_freqs, length);
        drop(ram);

        self.wal().append(&WalRecord {
            id: doc_id,
            content: content.to_string(),
            metadata: metadata.to_string(),
            length,
        })?;
        Ok(doc_id)
    }

    /// Runs the file searcher and the RAM searcher, merges scores by
    /// `doc_id`, and selects the global top-k.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        let tokens: Vec<String> = analyze(query, self.language)
            .into_iter()
            .filter(|t| !self.stopwords.contains(t))
            .collect();
        if tokens.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let index = self.index.read()?;
        let ram = self.ram.read()?;

        let mut merged: HashMap<u32, (f32, String)> = score_against_index(&index, &tokens)?;
        for (doc_id, score) in ram.search(&tokens) {
            merged.entry(doc_id).or_insert((0.0, doc_id.to_string())).0 += score;
        }
        drop(index);
        drop(ram);

        let hits: Vec<Hit> = merged
            .into_iter()
            .map(|(doc_id, (score, book_id))| Hit { doc_id, score, book_id })
            .collect();
        Ok(select_top_k(hits, top_k))
    }

    pub fn num_ram_documents(&self) -> Result<u32> {
        Ok(self.ram.read()?.num_docs())
    }

    /// Seals the RAM index's current contents into a new segment, extends
    /// the index metadata, then clears RAM and truncates the WAL — in
    /// that order, so a crash mid-flush always recovers via WAL replay
    /// (see SPEC_FULL.md §4.11, resolving the open question in spec §9).
    pub fn flush(&self) -> Result<()> {
        let mut index = self.index.write()?;
        let mut ram = self.ram.write()?;

        if ram.num_docs() == 0 {
            return Ok(());
        }

        let base_doc_id = index.next_doc_id();
        let mut docs: Vec<(u32, &crate::ram_index::Document)> = ram.documents().map(|(id, d)| (*id, d)).collect();
        docs.sort_unstable_by_key(|(id, _)| *id);

        let mut term_freqs_by_doc = ram.term_freqs_by_doc();
        let batch: Vec<ProcessedDoc> = docs
            .iter()
            .map(|(doc_id, document)| ProcessedDoc {
                book_id: document.metadata.clone(),
                chunks: vec![ProcessedChunk {
                    length: document.length,
                    term_freqs: term_freqs_by_doc.remove(doc_id).unwrap_or_default(),
                }],
            })
            .collect();

        let seg_name = format!("seg_{base_doc_id}");
        let meta = write_segment(&self.dir, &seg_name, &batch, base_doc_id)?;

        index.add_segment(&self.dir, &seg_name, meta.num_docs, meta.total_length)?;
        ram.clear();
        self.wal().truncate()?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn term_freqs_of(content: &str, language: StemmerLanguage) -> HashMap<String, u32> {
    let mut freqs = HashMap::new();
    for term in analyze(content, language) {
        *freqs.entry(term).or_insert(0u32) += 1;
    }
    freqs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_documents_survive_a_simulated_crash_before_flush() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let indexer = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
            for i in 0..100 {
                indexer.add_document(&format!("document number {i} about foxes"), &format!("meta-{i}")).unwrap();
            }
            assert_eq!(indexer.num_ram_documents().unwrap(), 100);
        }
        // Reopen as if after a crash: no flush happened, WAL must replay.
        let reopened = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
        assert_eq!(reopened.num_ram_documents().unwrap(), 100);
    }

    #[test]
    fn search_merges_ram_and_segment_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let indexer = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
        indexer.add_document("the quick brown fox", "ram-doc").unwrap();
        let hits = indexer.search("quick fox", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_query_yields_empty_result() {
        let tmp = tempfile::tempdir().unwrap();
        let indexer = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
        assert!(indexer.search("", 5).unwrap().is_empty());
    }

    #[test]
    fn flush_seals_ram_into_a_segment_and_truncates_the_wal() {
        let tmp = tempfile::tempdir().unwrap();
        let indexer = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
        indexer.add_document("the quick brown fox", "a").unwrap();
        indexer.add_document("lazy dog sleeps", "b").unwrap();

        indexer.flush().unwrap();
        assert_eq!(indexer.num_ram_documents().unwrap(), 0);

        let hits = indexer.search("quick fox", 5).unwrap();
        assert_eq!(hits.len(), 1);

        let reopened = RealTimeIndexer::new(tmp.path(), StemmerLanguage::English, Vec::new(), WalOptions::default()).unwrap();
        assert_eq!(reopened.num_ram_documents().unwrap(), 0);
        let hits_after_reopen = reopened.search("quick fox", 5).unwrap();
        assert_eq!(hits_after_reopen.len(), 1);
    }
}
