//! A segmented, BM25-ranked full-text search engine: on-disk segments, an
//! in-memory tail for documents not yet sealed, a write-ahead log, and two
//! searchers (an exhaustive file searcher and a WAND top-k searcher) unified
//! behind a near-real-time indexer.

pub mod analyzer;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod index;
pub mod parsers;
pub mod pipeline;
pub mod ram_index;
pub mod realtime;
pub mod search;
pub mod segment;
pub mod wal;

/// The library's external-facing surface (§6), re-exported under one path
/// so a caller embedding this crate (an HTTP handler, a CLI driver) doesn't
/// need to know the module layout underneath.
pub mod prelude {
    pub use crate::analyzer::analyze;
    pub use crate::codec::{encode_postings_separated as encode_postings, decode_postings, merge_postings};
    pub use crate::config::{Bm25Params, PipelineOptions, StemmerLanguage, WalOptions};
    pub use crate::error::{Error, Result};
    pub use crate::parsers::{chunk_text, file_hashes_batch, parse_epub, parse_pdf, parse_txt, DocumentFormat};
    pub use crate::pipeline::{index_corpus, index_corpus_file};
    pub use crate::realtime::RealTimeIndexer;
    pub use crate::search::file_searcher::FileSearcher;
    pub use crate::search::Hit;
}
