//! Plain configuration structs.
//!
//! Loading these from a file, environment, or CLI flags is the excluded
//! driver's job (see spec §1); this crate only defines the shape and the
//! spec's defaults.

use rust_stemmers::Algorithm;

/// BM25 scoring constants for one searcher.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Bm25Params {
    /// Constants used by the on-disk file searcher (§4.9).
    pub const fn segment_default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }

    /// Constants used by the in-memory RAM index (§4.6). Left distinct
    /// from `segment_default` by design — see SPEC_FULL.md §4.11.
    pub const fn ram_default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemmerLanguage {
    Portuguese,
    English,
    Spanish,
    French,
}

impl StemmerLanguage {
    pub(crate) fn algorithm(self) -> Algorithm {
        match self {
            Self::Portuguese => Algorithm::Portuguese,
            Self::English => Algorithm::English,
            Self::Spanish => Algorithm::Spanish,
            Self::French => Algorithm::French,
        }
    }
}

impl Default for StemmerLanguage {
    fn default() -> Self {
        Self::Portuguese
    }
}

/// Knobs that shape the pipeline's three stages (§4.8). The complete
/// configuration surface named by the spec.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub stopwords: Vec<String>,
    pub workers: usize,
    pub download_concurrency: usize,
    pub reindex: bool,
    pub stemmer: StemmerLanguage,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 1000,
            stopwords: Vec::new(),
            workers: num_cpus(),
            download_concurrency: 8,
            reindex: false,
            stemmer: StemmerLanguage::default(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Whether [`crate::wal::Wal::append`] forces a synchronized disk flush.
/// Unspecified by the spec beyond "should be an explicit option"; defaults
/// to `false` to match the stated default durability posture (survives a
/// process crash, not an OS crash).
#[derive(Debug, Clone, Copy)]
pub struct WalOptions {
    pub fsync: bool,
}

impl Default for WalOptions {
    fn default() -> Self {
        Self { fsync: false }
    }
}
