//! Builds one immutable segment from a batch of processed documents (§4.4).

use crate::codec::{encode_postings_separated, Posting};
use crate::directory::{atomic_write, Directory};
use crate::error::Result;
use crate::segment::format::{
    OffsetRecord, SegmentMeta, CHUNKS_FILE, DOC_LENGTHS_FILE, META_FILE, OFFSETS_FILE,
    POSTINGS_DOCS_FILE, POSTINGS_FREQS_FILE, TERMS_FILE,
};
use byteorder::{LittleEndian, WriteBytesExt};
use fst::MapBuilder;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

/// One chunk of a processed document: its analyzed term frequencies and
/// its token-count length.
#[derive(Debug, Clone, Default)]
pub struct ProcessedChunk {
    pub length: u32,
    pub term_freqs: HashMap<String, u32>,
}

/// One processed document, already split into chunks by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ProcessedDoc {
    pub book_id: String,
    pub chunks: Vec<ProcessedChunk>,
}

/// Writes `batch` (documents whose chunks become individual `doc_id`s
/// starting at `base_doc_id`) into a fresh segment directory. On any
/// write failure the caller must delete `out_dir` (§4.4, §7) — this
/// function does not clean up its own partial output.
pub fn write_segment(
    dir: &impl Directory,
    out_dir: &str,
    batch: &[ProcessedDoc],
    base_doc_id: u32,
) -> Result<SegmentMeta> {
    // Step 1: flatten chunks into parallel arrays, in doc-id order.
    let mut book_ids: Vec<&str> = Vec::new();
    let mut doc_lengths: Vec<u32> = Vec::new();
    let mut chunk_freqs: Vec<&HashMap<String, u32>> = Vec::new();
    for doc in batch {
        for chunk in &doc.chunks {
            book_ids.push(&doc.book_id);
            doc_lengths.push(chunk.length);
            chunk_freqs.push(&chunk.term_freqs);
        }
    }
    let num_docs = book_ids.len() as u32;
    let total_length: u64 = doc_lengths.iter().map(|&l| l as u64).sum();

    // Step 2: build term -> postings by iterating chunks in doc-id order,
    // so every posting list comes out already sorted by doc_id.
    let mut inverted: HashMap<&str, Vec<Posting>> = HashMap::new();
    for (i, freqs) in chunk_freqs.iter().enumerate() {
        let doc_id = base_doc_id + i as u32;
        for (term, &tf) in freqs.iter() {
            inverted.entry(term.as_str()).or_default().push((doc_id, tf));
        }
    }

    // Step 3: sort terms lexicographically.
    let mut terms: Vec<&str> = inverted.keys().copied().collect();
    terms.sort_unstable();

    // Step 4: encode posting lists in parallel.
    let encoded: Vec<(Vec<u8>, Vec<u8>)> = terms
        .par_iter()
        .map(|term| encode_postings_separated(&inverted[term]))
        .collect();

    // Step 5: lay out offsets and concatenate the streams.
    let mut postings_docs = Vec::new();
    let mut postings_freqs = Vec::new();
    let mut offsets = Vec::with_capacity(terms.len() * crate::segment::format::OFFSET_RECORD_SIZE);
    let mut fst_builder = MapBuilder::memory();
    for (ordinal, (term, (doc_bytes, freq_bytes))) in terms.iter().zip(encoded.iter()).enumerate() {
        let record = OffsetRecord {
            doc_offset: postings_docs.len() as u64,
            doc_len: doc_bytes.len() as u32,
            freq_offset: postings_freqs.len() as u64,
            freq_len: freq_bytes.len() as u32,
            doc_count: inverted[term].len() as u32,
        };
        record.write_to(&mut offsets);
        postings_docs.extend_from_slice(doc_bytes);
        postings_freqs.extend_from_slice(freq_bytes);
        fst_builder
            .insert(term.as_bytes(), ordinal as u64)
            .map_err(|e| crate::error::Error::Format {
                message: format!("FST insertion failed for term {term:?}: {e}"),
                path: Some(TERMS_FILE.to_string()),
            })?;
    }
    let fst_bytes = fst_builder
        .into_inner()
        .map_err(|e| crate::error::Error::Format {
            message: format!("FST build failed: {e}"),
            path: Some(TERMS_FILE.to_string()),
        })?;

    // Step 6: write each file. meta.json is written last (step 7).
    dir.create_dir_all(out_dir)?;
    dir.create_file(&format!("{out_dir}/{TERMS_FILE}"))?.write_all(&fst_bytes)?;
    dir.create_file(&format!("{out_dir}/{OFFSETS_FILE}"))?.write_all(&offsets)?;
    dir.create_file(&format!("{out_dir}/{POSTINGS_DOCS_FILE}"))?.write_all(&postings_docs)?;
    dir.create_file(&format!("{out_dir}/{POSTINGS_FREQS_FILE}"))?.write_all(&postings_freqs)?;

    let mut chunks_bytes = Vec::new();
    for book_id in &book_ids {
        chunks_bytes.write_u16::<LittleEndian>(book_id.len() as u16)?;
        chunks_bytes.extend_from_slice(book_id.as_bytes());
    }
    dir.create_file(&format!("{out_dir}/{CHUNKS_FILE}"))?.write_all(&chunks_bytes)?;

    let mut lengths_bytes = Vec::with_capacity(doc_lengths.len() * 4);
    for &len in &doc_lengths {
        lengths_bytes.write_u32::<LittleEndian>(len)?;
    }
    dir.create_file(&format!("{out_dir}/{DOC_LENGTHS_FILE}"))?.write_all(&lengths_bytes)?;

    let meta = SegmentMeta { num_docs, base_doc_id, total_length };
    atomic_write(dir, &format!("{out_dir}/{META_FILE}"), serde_json::to_string(&meta)?.as_bytes())?;

    tracing::info!(out_dir, num_docs, base_doc_id, total_length, "wrote segment");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;
    use crate::segment::reader::SegmentReader;

    fn chunk(length: u32, terms: &[(&str, u32)]) -> ProcessedChunk {
        ProcessedChunk {
            length,
            term_freqs: terms.iter().map(|(t, f)| (t.to_string(), *f)).collect(),
        }
    }

    #[test]
    fn writes_segment_readable_by_the_reader() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();

        let batch = vec![
            ProcessedDoc {
                book_id: "a".to_string(),
                chunks: vec![chunk(4, &[("quick", 1), ("brown", 1), ("fox", 1), ("the", 1)])],
            },
            ProcessedDoc {
                book_id: "b".to_string(),
                chunks: vec![chunk(3, &[("lazy", 1), ("dog", 1), ("sleeps", 1)])],
            },
        ];

        let meta = write_segment(&dir, "seg_0", &batch, 0).unwrap();
        assert_eq!(meta.num_docs, 2);
        assert_eq!(meta.base_doc_id, 0);
        assert_eq!(meta.total_length, 7);

        let reader = SegmentReader::open(&dir, "seg_0").unwrap();
        assert_eq!(reader.get_df("fox").unwrap(), Some(1));
        assert_eq!(reader.book_id(0).unwrap(), "a");
        assert_eq!(reader.book_id(1).unwrap(), "b");
        assert_eq!(reader.doc_length(0).unwrap(), 4);
    }
}
