//! The index aggregate: an ordered list of segment directories plus global
//! `total_docs`/`avgdl` bookkeeping, persisted as `index.json` (§3, §6).

use crate::directory::{atomic_write, Directory};
use crate::error::Result;
use crate::segment::reader::SegmentReader;
use serde::{Deserialize, Serialize};

const INDEX_META_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexMeta {
    segments: Vec<String>,
    total_docs: u32,
    avgdl: f32,
}

/// Every open segment reader plus the corpus-wide statistics queries need.
pub struct Index {
    pub segments: Vec<SegmentReader>,
    pub total_docs: u32,
    pub avgdl: f32,
}

impl Index {
    /// Opens every segment named in `index.json` (or starts an empty index
    /// if it doesn't exist yet).
    pub fn open(dir: &impl Directory) -> Result<Self> {
        if !dir.exists(INDEX_META_FILE) {
            return Ok(Self { segments: Vec::new(), total_docs: 0, avgdl: 0.0 });
        }
        let meta = Self::read_meta(dir)?;
        let mut segments = Vec::with_capacity(meta.segments.len());
        for name in &meta.segments {
            match SegmentReader::open(dir, name) {
                Ok(reader) => segments.push(reader),
                Err(e) => tracing::warn!(segment = name.as_str(), error = %e, "skipping corrupt segment on open"),
            }
        }
        Ok(Self { segments, total_docs: meta.total_docs, avgdl: meta.avgdl })
    }

    fn read_meta(dir: &impl Directory) -> Result<IndexMeta> {
        use std::io::Read;
        let mut file = dir.open_file(INDEX_META_FILE)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    /// Appends a newly-written segment to the index and persists the
    /// updated `index.json`.
    pub fn add_segment(&mut self, dir: &impl Directory, seg_dir_name: &str, num_docs: u32, total_length: u64) -> Result<()> {
        let reader = SegmentReader::open(dir, seg_dir_name)?;
        self.segments.push(reader);

        let prior_total_length = (self.avgdl as f64) * (self.total_docs as f64);
        self.total_docs += num_docs;
        self.avgdl = if self.total_docs == 0 {
            0.0
        } else {
            ((prior_total_length + total_length as f64) / self.total_docs as f64) as f32
        };

        let meta = IndexMeta {
            segments: self.segments.iter().map(|s| s.dir_name.clone()).collect(),
            total_docs: self.total_docs,
            avgdl: self.avgdl,
        };
        atomic_write(dir, INDEX_META_FILE, serde_json::to_string(&meta)?.as_bytes())
    }

    /// The `doc_id` the next document added to this index (via the
    /// pipeline or a flush) should receive.
    pub fn next_doc_id(&self) -> u32 {
        self.total_docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;
    use crate::segment::writer::{write_segment, ProcessedChunk, ProcessedDoc};
    use std::collections::HashMap;

    fn one_doc_batch(book_id: &str, terms: &[&str]) -> Vec<ProcessedDoc> {
        let mut freqs = HashMap::new();
        for t in terms {
            *freqs.entry(t.to_string()).or_insert(0u32) += 1;
        }
        vec![ProcessedDoc {
            book_id: book_id.to_string(),
            chunks: vec![ProcessedChunk { length: terms.len() as u32, term_freqs: freqs }],
        }]
    }

    #[test]
    fn opening_a_fresh_directory_yields_an_empty_index() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let index = Index::open(&dir).unwrap();
        assert_eq!(index.total_docs, 0);
        assert_eq!(index.segments.len(), 0);
    }

    #[test]
    fn avgdl_is_weighted_across_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let mut index = Index::open(&dir).unwrap();

        let batch_a = one_doc_batch("a", &["quick", "fox"]);
        let meta_a = write_segment(&dir, "seg_0", &batch_a, 0).unwrap();
        index.add_segment(&dir, "seg_0", meta_a.num_docs, meta_a.total_length).unwrap();

        let batch_b = one_doc_batch("b", &["lazy", "dog", "sleeps", "here"]);
        let meta_b = write_segment(&dir, "seg_1", &batch_b, index.next_doc_id()).unwrap();
        index.add_segment(&dir, "seg_1", meta_b.num_docs, meta_b.total_length).unwrap();

        assert_eq!(index.total_docs, 2);
        assert_eq!(index.avgdl, 3.0);

        let reopened = Index::open(&dir).unwrap();
        assert_eq!(reopened.total_docs, 2);
        assert_eq!(reopened.segments.len(), 2);
    }
}
