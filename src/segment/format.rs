//! The on-disk file set for one immutable segment (§4.3).
//!
//! ```text
//! terms.fst           term string -> ordinal (u64), FST
//! offsets.bin         fixed 28-byte records indexed by ordinal
//! postings_docs.bin   concatenated block-encoded doc-id-delta streams
//! postings_freqs.bin  concatenated block-encoded tf streams
//! chunks.bin          per-document doc_id -> book_id, length-prefixed
//! doc_lengths.bin     num_docs consecutive u32 LE
//! meta.json           {num_docs, base_doc_id, total_length}
//! ```
//!
//! All integers little-endian. Presence of `meta.json` is the segment
//! commit marker: it is written last by the writer and is the first thing
//! a reader checks for on `open`.

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

pub const TERMS_FILE: &str = "terms.fst";
pub const OFFSETS_FILE: &str = "offsets.bin";
pub const POSTINGS_DOCS_FILE: &str = "postings_docs.bin";
pub const POSTINGS_FREQS_FILE: &str = "postings_freqs.bin";
pub const CHUNKS_FILE: &str = "chunks.bin";
pub const DOC_LENGTHS_FILE: &str = "doc_lengths.bin";
pub const META_FILE: &str = "meta.json";

/// Size in bytes of one `offsets.bin` record.
pub const OFFSET_RECORD_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRecord {
    pub doc_offset: u64,
    pub doc_len: u32,
    pub freq_offset: u64,
    pub freq_len: u32,
    /// Document frequency (`df`) — number of postings for this term.
    pub doc_count: u32,
}

impl OffsetRecord {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; OFFSET_RECORD_SIZE];
        LittleEndian::write_u64(&mut buf[0..8], self.doc_offset);
        LittleEndian::write_u32(&mut buf[8..12], self.doc_len);
        LittleEndian::write_u64(&mut buf[12..20], self.freq_offset);
        LittleEndian::write_u32(&mut buf[20..24], self.freq_len);
        LittleEndian::write_u32(&mut buf[24..28], self.doc_count);
        out.extend_from_slice(&buf);
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < OFFSET_RECORD_SIZE {
            return Err(Error::Format {
                message: format!("offsets.bin record truncated: need {OFFSET_RECORD_SIZE} bytes, have {}", bytes.len()),
                path: Some(OFFSETS_FILE.to_string()),
            });
        }
        Ok(Self {
            doc_offset: LittleEndian::read_u64(&bytes[0..8]),
            doc_len: LittleEndian::read_u32(&bytes[8..12]),
            freq_offset: LittleEndian::read_u64(&bytes[12..20]),
            freq_len: LittleEndian::read_u32(&bytes[20..24]),
            doc_count: LittleEndian::read_u32(&bytes[24..28]),
        })
    }
}

/// `meta.json` contents. Presence of this file is the segment commit
/// marker (§4.3 rationale, §4.4 step 7, §8 "segment commit atomicity").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub num_docs: u32,
    pub base_doc_id: u32,
    pub total_length: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_record_roundtrips() {
        let record = OffsetRecord {
            doc_offset: 123_456,
            doc_len: 789,
            freq_offset: 42,
            freq_len: 17,
            doc_count: 9001,
        };
        let mut buf = Vec::new();
        record.write_to(&mut buf);
        assert_eq!(buf.len(), OFFSET_RECORD_SIZE);
        let decoded = OffsetRecord::read_from(&buf).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn meta_json_roundtrips() {
        let meta = SegmentMeta { num_docs: 10, base_doc_id: 100, total_length: 4000 };
        let json = serde_json::to_string(&meta).unwrap();
        let decoded: SegmentMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.num_docs, meta.num_docs);
        assert_eq!(decoded.base_doc_id, meta.base_doc_id);
        assert_eq!(decoded.total_length, meta.total_length);
    }
}
