//! Memory-maps a segment's files and exposes streaming posting iterators
//! without copying (§4.5).

use crate::codec::{self, BLOCK_SIZE};
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::segment::format::{
    OffsetRecord, SegmentMeta, CHUNKS_FILE, DOC_LENGTHS_FILE, META_FILE, OFFSETS_FILE,
    OFFSET_RECORD_SIZE, POSTINGS_DOCS_FILE, POSTINGS_FREQS_FILE, TERMS_FILE,
};
use byteorder::{ByteOrder, LittleEndian};
use fst::{IntoStreamer, Map, Streamer};
use levenshtein_automata::{LevenshteinAutomatonBuilder, DFA};
use memmap2::Mmap;
use std::sync::OnceLock;

fn mmap_file(dir: &impl Directory, seg_dir: &str, file_name: &str) -> Result<Mmap> {
    let file = dir.open_file(&format!("{seg_dir}/{file_name}"))?;
    // SAFETY: segments are immutable once `meta.json` is written; nothing
    // in this process or another mutates these files after commit.
    unsafe { Mmap::map(&file) }.map_err(Error::Io)
}

/// A single open, immutable segment. `Send + Sync` because all state is
/// read-only memory-mapped bytes after construction — no interior
/// mutability is introduced here.
pub struct SegmentReader {
    pub dir_name: String,
    terms: Map<Mmap>,
    offsets: Mmap,
    postings_docs: Mmap,
    postings_freqs: Mmap,
    chunk_offsets: Vec<u32>,
    chunks: Mmap,
    doc_lengths: Mmap,
    pub meta: SegmentMeta,
}

impl SegmentReader {
    /// Opens a segment directory. A directory missing `meta.json` is
    /// reported as [`Error::NotFound`] (§8 "segment commit atomicity") —
    /// callers should treat that as "segment not yet committed", not a
    /// format error.
    pub fn open(dir: &impl Directory, seg_dir: &str) -> Result<Self> {
        let meta_path = format!("{seg_dir}/{META_FILE}");
        if !dir.exists(&meta_path) {
            return Err(Error::NotFound(format!("{seg_dir}/{META_FILE}")));
        }
        let meta_bytes = {
            use std::io::Read;
            let mut f = dir.open_file(&meta_path)?;
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            buf
        };
        let meta: SegmentMeta = serde_json::from_slice(&meta_bytes)?;

        let terms_mmap = mmap_file(dir, seg_dir, TERMS_FILE)?;
        let terms = Map::new(terms_mmap).map_err(|e| Error::Format {
            message: format!("invalid terms.fst: {e}"),
            path: Some(format!("{seg_dir}/{TERMS_FILE}")),
        })?;

        let chunks = mmap_file(dir, seg_dir, CHUNKS_FILE)?;
        let chunk_offsets = build_chunk_offsets(&chunks, meta.num_docs as usize)?;

        Ok(Self {
            dir_name: seg_dir.to_string(),
            terms,
            offsets: mmap_file(dir, seg_dir, OFFSETS_FILE)?,
            postings_docs: mmap_file(dir, seg_dir, POSTINGS_DOCS_FILE)?,
            postings_freqs: mmap_file(dir, seg_dir, POSTINGS_FREQS_FILE)?,
            chunk_offsets,
            chunks,
            doc_lengths: mmap_file(dir, seg_dir, DOC_LENGTHS_FILE)?,
            meta,
        })
    }

    fn offset_record(&self, ordinal: u64) -> Result<OffsetRecord> {
        let start = ordinal as usize * OFFSET_RECORD_SIZE;
        let end = start + OFFSET_RECORD_SIZE;
        let bytes = self.offsets.get(start..end).ok_or_else(|| Error::Format {
            message: format!("ordinal {ordinal} out of range"),
            path: Some(format!("{}/{OFFSETS_FILE}", self.dir_name)),
        })?;
        OffsetRecord::read_from(bytes)
    }

    /// Document frequency for `term`, or `None` if the term is absent.
    pub fn get_df(&self, term: &str) -> Result<Option<u32>> {
        match self.terms.get(term) {
            Some(ordinal) => Ok(Some(self.offset_record(ordinal)?.doc_count)),
            None => Ok(None),
        }
    }

    /// A streaming iterator over `term`'s postings, or `None` if absent.
    pub fn get_postings(&self, term: &str) -> Result<Option<PostingsIter<'_>>> {
        let Some(ordinal) = self.terms.get(term) else {
            return Ok(None);
        };
        let record = self.offset_record(ordinal)?;
        Ok(Some(PostingsIter::new(
            &self.postings_docs[record.doc_offset as usize..(record.doc_offset + record.doc_len as u64) as usize],
            &self.postings_freqs[record.freq_offset as usize..(record.freq_offset + record.freq_len as u64) as usize],
            record.doc_count as usize,
        )))
    }

    /// Terms within Levenshtein distance `max_distance` of `term`,
    /// composed with the FST dictionary (§4.5).
    pub fn fuzzy_terms(&self, term: &str, max_distance: u8) -> Vec<String> {
        let builder = automaton_builder(max_distance);
        let dfa = builder.build_dfa(term);
        let mut stream = self.terms.search(&dfa).into_stream();
        let mut out = Vec::new();
        while let Some((term_bytes, _ordinal)) = stream.next() {
            if let Ok(s) = std::str::from_utf8(term_bytes) {
                out.push(s.to_string());
            }
        }
        out
    }

    pub fn doc_length(&self, local_doc_id: u32) -> Result<u32> {
        let start = local_doc_id as usize * 4;
        self.doc_lengths
            .get(start..start + 4)
            .map(LittleEndian::read_u32)
            .ok_or_else(|| Error::Format {
                message: format!("doc_id {local_doc_id} out of range"),
                path: Some(format!("{}/{DOC_LENGTHS_FILE}", self.dir_name)),
            })
    }

    pub fn book_id(&self, local_doc_id: u32) -> Result<&str> {
        let idx = local_doc_id as usize;
        let start = *self.chunk_offsets.get(idx).ok_or_else(|| Error::Format {
            message: format!("doc_id {local_doc_id} out of range"),
            path: Some(format!("{}/{CHUNKS_FILE}", self.dir_name)),
        })? as usize;
        let len = LittleEndian::read_u16(&self.chunks[start..start + 2]) as usize;
        std::str::from_utf8(&self.chunks[start + 2..start + 2 + len]).map_err(|e| Error::Format {
            message: format!("chunks.bin book_id is not valid UTF-8: {e}"),
            path: Some(format!("{}/{CHUNKS_FILE}", self.dir_name)),
        })
    }
}

fn build_chunk_offsets(chunks: &[u8], num_docs: usize) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(num_docs);
    let mut cursor = 0usize;
    for _ in 0..num_docs {
        offsets.push(cursor as u32);
        let len = LittleEndian::read_u16(chunks.get(cursor..cursor + 2).ok_or_else(|| Error::Format {
            message: "chunks.bin truncated".to_string(),
            path: Some(CHUNKS_FILE.to_string()),
        })?) as usize;
        cursor += 2 + len;
    }
    Ok(offsets)
}

/// Selects the Levenshtein distance used for fuzzy term resolution: `2`
/// for terms longer than 4 characters, else `1` (§4.5).
pub fn fuzzy_distance_for(term: &str) -> u8 {
    if term.chars().count() > 4 {
        2
    } else {
        1
    }
}

// `LevenshteinAutomatonBuilder` construction walks a sizeable transition
// table; share one builder per distance across all fuzzy queries.
static BUILDER_1: OnceLock<LevenshteinAutomatonBuilder> = OnceLock::new();
static BUILDER_2: OnceLock<LevenshteinAutomatonBuilder> = OnceLock::new();

fn automaton_builder(max_distance: u8) -> &'static LevenshteinAutomatonBuilder {
    match max_distance {
        1 => BUILDER_1.get_or_init(|| LevenshteinAutomatonBuilder::new(1, true)),
        _ => BUILDER_2.get_or_init(|| LevenshteinAutomatonBuilder::new(2, true)),
    }
}

/// Streams one term's postings without materializing the full list.
/// Carries two [`BLOCK_SIZE`]-entry stack buffers, decoding one block at a
/// time; switches to varint decoding once fewer than `BLOCK_SIZE`
/// postings remain. Yields exactly `doc_count` `(doc_id, tf)` pairs in
/// strictly increasing `doc_id` order.
pub struct PostingsIter<'a> {
    doc_bytes: &'a [u8],
    freq_bytes: &'a [u8],
    remaining: usize,
    doc_offset: usize,
    freq_offset: usize,
    running_doc_id: u32,
    started: bool,
    block_docs: [u32; BLOCK_SIZE],
    block_freqs: [u32; BLOCK_SIZE],
    block_pos: usize,
    block_len: usize,
}

impl<'a> PostingsIter<'a> {
    fn new(doc_bytes: &'a [u8], freq_bytes: &'a [u8], count: usize) -> Self {
        Self {
            doc_bytes,
            freq_bytes,
            remaining: count,
            doc_offset: 0,
            freq_offset: 0,
            running_doc_id: 0,
            started: false,
            block_docs: [0; BLOCK_SIZE],
            block_freqs: [0; BLOCK_SIZE],
            block_pos: 0,
            block_len: 0,
        }
    }

    fn fill_next_block(&mut self) -> Result<()> {
        let take = self.remaining.min(BLOCK_SIZE);
        if take == BLOCK_SIZE {
            let doc_width = self.doc_bytes[self.doc_offset];
            self.doc_offset += 1;
            codec_unpack_block(&self.doc_bytes[self.doc_offset..], doc_width, &mut self.block_docs)?;
            self.doc_offset += 16 * doc_width as usize;

            let freq_width = self.freq_bytes[self.freq_offset];
            self.freq_offset += 1;
            codec_unpack_block(&self.freq_bytes[self.freq_offset..], freq_width, &mut self.block_freqs)?;
            self.freq_offset += 16 * freq_width as usize;

            for i in 0..BLOCK_SIZE {
                self.running_doc_id = if !self.started && i == 0 {
                    self.block_docs[0]
                } else {
                    self.running_doc_id + self.block_docs[i]
                };
                self.block_docs[i] = self.running_doc_id;
                self.started = true;
            }
        } else {
            let (deltas, read) = codec::varint::decode_many(&self.doc_bytes[self.doc_offset..], take)?;
            self.doc_offset += read;
            let (freqs, read) = codec::varint::decode_many(&self.freq_bytes[self.freq_offset..], take)?;
            self.freq_offset += read;
            for i in 0..take {
                self.running_doc_id = if !self.started && i == 0 {
                    deltas[0] as u32
                } else {
                    self.running_doc_id + deltas[i] as u32
                };
                self.block_docs[i] = self.running_doc_id;
                self.block_freqs[i] = freqs[i] as u32;
                self.started = true;
            }
        }
        self.block_len = take;
        self.block_pos = 0;
        Ok(())
    }
}

impl<'a> Iterator for PostingsIter<'a> {
    type Item = Result<(u32, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.block_pos == self.block_len {
            if let Err(e) = self.fill_next_block() {
                self.remaining = 0;
                return Some(Err(e));
            }
        }
        let result = (self.block_docs[self.block_pos], self.block_freqs[self.block_pos]);
        self.block_pos += 1;
        self.remaining -= 1;
        Some(Ok(result))
    }
}

fn codec_unpack_block(data: &[u8], width: u8, out: &mut [u32; BLOCK_SIZE]) -> Result<()> {
    // Delegates to the same bit-unpacking routine the whole-list decoder
    // uses; kept private to `codec` so it's re-exposed here minimally.
    crate::codec::unpack_block_for_streaming(data, width, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;
    use crate::segment::writer::{write_segment, ProcessedChunk, ProcessedDoc};
    use std::collections::HashMap;

    fn make_segment(dir: &FsDirectory, name: &str, postings_len: usize) {
        let mut chunks = Vec::new();
        for i in 0..postings_len {
            let mut freqs = HashMap::new();
            freqs.insert("common".to_string(), 1);
            if i % 2 == 0 {
                freqs.insert("even".to_string(), 2);
            }
            chunks.push(ProcessedChunk { length: 5, term_freqs: freqs });
        }
        let batch = vec![ProcessedDoc { book_id: "book".to_string(), chunks }];
        write_segment(dir, name, &batch, 0).unwrap();
    }

    #[test]
    fn postings_iter_yields_all_entries_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        make_segment(&dir, "seg", 300);
        let reader = SegmentReader::open(&dir, "seg").unwrap();

        let iter = reader.get_postings("common").unwrap().unwrap();
        let postings: Result<Vec<_>> = iter.collect();
        let postings = postings.unwrap();
        assert_eq!(postings.len(), 300);
        for w in postings.windows(2) {
            assert!(w[0].0 < w[1].0);
        }
    }

    #[test]
    fn missing_segment_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        dir.create_dir_all("incomplete").unwrap();
        let err = SegmentReader::open(&dir, "incomplete").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn fuzzy_terms_finds_near_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        make_segment(&dir, "seg", 5);
        let reader = SegmentReader::open(&dir, "seg").unwrap();
        let matches = reader.fuzzy_terms("commen", fuzzy_distance_for("commen"));
        assert!(matches.contains(&"common".to_string()));
    }
}
