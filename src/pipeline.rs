//! The three-stage ingestion pipeline: load, process, index (§4.8).
//!
//! Stage 1 (loader) is a single-threaded cooperative `tokio` runtime bounded
//! by a semaphore — async I/O, not CPU work. Stage 2 (processor) is a
//! `rayon` work-stealing pool: parsing, chunking, and analysis happen here,
//! one `bumpalo` arena per worker thread, reset per document. Stage 3
//! (indexer) is a single dedicated thread that batches `ProcessedDoc`s and
//! writes segments. The channel between stage 2 and stage 3 has capacity 1
//! — that backpressure is load-bearing, not incidental (§5).

use crate::analyzer::analyze_into;
use crate::config::{PipelineOptions, StemmerLanguage};
use crate::directory::{Directory, FsDirectory};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::parsers::{parse_document_bytes, DocumentFormat};
use crate::segment::writer::{write_segment, ProcessedChunk, ProcessedDoc};
use bumpalo::Bump;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Walks `source_dir` and indexes every file whose extension matches a
/// known [`DocumentFormat`] into `index_dir`, following `options`. Returns
/// `(num_books, num_chunks)` (§6).
pub fn index_corpus(source_dir: &Path, index_dir: &Path, options: &PipelineOptions) -> Result<(usize, usize)> {
    let dir = FsDirectory::new(index_dir)?;
    if options.reindex {
        for name in dir.list_dir("")? {
            if name.starts_with("seg_") {
                dir.remove_dir_all(&name)?;
            }
        }
    }

    let files = collect_source_files(source_dir)?;
    let num_books = files.len();
    let stopwords: std::collections::HashSet<String> = options.stopwords.iter().cloned().collect();

    // Stage 1: async loader, bounded by a semaphore, current-thread runtime.
    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<(PathBuf, Vec<u8>, DocumentFormat)>();
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(options.download_concurrency.max(1)));
        runtime.block_on(async {
            let mut tasks = Vec::with_capacity(files.len());
            for (path, format) in files {
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                let tx = raw_tx.clone();
                tasks.push(tokio::spawn(async move {
                    let _permit = permit;
                    if let Ok(bytes) = tokio::fs::read(&path).await {
                        let _ = tx.send((path, bytes, format));
                    } else {
                        tracing::warn!(path = %path.display(), "failed to read source file");
                    }
                }));
            }
            for task in tasks {
                let _ = task.await;
            }
        });
    }
    drop(raw_tx);

    // Stage 2 -> stage 3 channel; capacity 1 is the pipeline's backpressure.
    let (proc_tx, proc_rx) = std::sync::mpsc::sync_channel::<ProcessedDoc>(1);
    let num_chunks = Arc::new(AtomicUsize::new(0));

    let processor = {
        let num_chunks = num_chunks.clone();
        let stopwords = stopwords.clone();
        let chunk_size = options.chunk_size;
        let chunk_overlap = options.chunk_overlap;
        let stemmer = options.stemmer;
        let workers = options.workers.max(1);
        std::thread::spawn(move || -> Result<()> {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| Error::InvalidArgument(format!("failed to build processor thread pool: {e}")))?;
            pool.scope(|scope| {
                for (path, bytes, format) in raw_rx {
                    let proc_tx = proc_tx.clone();
                    let num_chunks = num_chunks.clone();
                    let stopwords = &stopwords;
                    scope.spawn(move |_| {
                        match process_one(&path, &bytes, format, chunk_size, chunk_overlap, stemmer, stopwords) {
                            Ok(doc) => {
                                num_chunks.fetch_add(doc.chunks.len(), Ordering::Relaxed);
                                let _ = proc_tx.send(doc);
                            }
                            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unparseable document"),
                        }
                    });
                }
            });
            Ok(())
        })
    };

    // Stage 3: this thread is the single indexer.
    let mut index = Index::open(&dir)?;
    let mut batch: Vec<ProcessedDoc> = Vec::new();
    for doc in proc_rx {
        batch.push(doc);
        if batch.len() >= options.batch_size.max(1) {
            seal_batch(&dir, &mut index, &mut batch)?;
        }
    }
    if !batch.is_empty() {
        seal_batch(&dir, &mut index, &mut batch)?;
    }

    processor
        .join()
        .map_err(|_| Error::InvalidArgument("pipeline processor thread panicked".to_string()))??;

    Ok((num_books, num_chunks.load(Ordering::Relaxed)))
}

/// The external-interface entry point named in §6: builds [`PipelineOptions`]
/// from individually named parameters and runs [`index_corpus`]. `chunks_dir`
/// additionally receives one `.txt` file per chunk (`{book_id}_{n}.txt`) as
/// an inspectable intermediate artifact — useful for debugging a run without
/// re-deriving chunk boundaries from the sealed segment.
pub fn index_corpus_file(
    books_dir: &Path,
    index_dir: &Path,
    chunks_dir: &Path,
    stopwords: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
) -> Result<(usize, usize)> {
    std::fs::create_dir_all(chunks_dir)?;
    let options = PipelineOptions {
        chunk_size,
        chunk_overlap,
        batch_size,
        stopwords,
        ..PipelineOptions::default()
    };

    let files = collect_source_files(books_dir)?;
    for (path, format) in &files {
        let Ok(bytes) = std::fs::read(path) else { continue };
        let Ok(text) = parse_document_bytes(&bytes, *format, path) else { continue };
        let book_id = book_id_of(path);
        for (i, chunk) in crate::parsers::chunk_text(&text, chunk_size, chunk_overlap).iter().enumerate() {
            let out = chunks_dir.join(format!("{book_id}_{i}.txt"));
            let _ = std::fs::write(out, chunk);
        }
    }

    index_corpus(books_dir, index_dir, &options)
}

fn seal_batch(dir: &FsDirectory, index: &mut Index, batch: &mut Vec<ProcessedDoc>) -> Result<()> {
    let base_doc_id = index.next_doc_id();
    let seg_name = format!("seg_{base_doc_id}");
    match write_segment(dir, &seg_name, batch, base_doc_id) {
        Ok(meta) => {
            index.add_segment(dir, &seg_name, meta.num_docs, meta.total_length)?;
            tracing::info!(seg_name, num_docs = meta.num_docs, "sealed pipeline batch");
        }
        Err(e) => {
            dir.remove_dir_all(&seg_name)?;
            return Err(e);
        }
    }
    batch.clear();
    Ok(())
}

fn process_one(
    path: &Path,
    bytes: &[u8],
    format: DocumentFormat,
    chunk_size: usize,
    chunk_overlap: usize,
    stemmer: StemmerLanguage,
    stopwords: &std::collections::HashSet<String>,
) -> Result<ProcessedDoc> {
    let text = parse_document_bytes(bytes, format, path)?;
    let book_id = book_id_of(path);
    let chunks_text = crate::parsers::chunk_text(&text, chunk_size, chunk_overlap);

    let mut arena = Bump::new();
    let mut chunks = Vec::with_capacity(chunks_text.len());
    for chunk_text in &chunks_text {
        arena.reset();
        let mut tokens: Vec<&str> = Vec::new();
        analyze_into(chunk_text, stemmer, &arena, &mut tokens);

        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        let mut length = 0u32;
        for token in &tokens {
            if stopwords.contains(*token) {
                continue;
            }
            *term_freqs.entry(token.to_string()).or_insert(0) += 1;
            length += 1;
        }
        chunks.push(ProcessedChunk { length, term_freqs });
    }

    Ok(ProcessedDoc { book_id, chunks })
}

fn book_id_of(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string()
}

fn collect_source_files(source_dir: &Path) -> Result<Vec<(PathBuf, DocumentFormat)>> {
    let mut files = Vec::new();
    if !source_dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(source_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(format) = DocumentFormat::from_extension(&path) {
            files.push((path, format));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::file_searcher::FileSearcher;

    #[test]
    fn indexes_a_small_corpus_of_text_files() {
        let books = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(books.path().join("a.txt"), "the quick brown fox jumps").unwrap();
        std::fs::write(books.path().join("b.txt"), "lazy dog sleeps all day").unwrap();

        let options = PipelineOptions { batch_size: 10, ..PipelineOptions::default() };
        let (num_books, num_chunks) = index_corpus(books.path(), index_dir.path(), &options).unwrap();
        assert_eq!(num_books, 2);
        assert_eq!(num_chunks, 2);

        let searcher = FileSearcher::open(index_dir.path(), StemmerLanguage::English, Vec::new()).unwrap();
        let hits = searcher.search("quick fox", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].book_id, "a");
    }

    #[test]
    fn batch_size_smaller_than_corpus_seals_multiple_segments() {
        let books = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(books.path().join(format!("book{i}.txt")), format!("document {i} about foxes")).unwrap();
        }

        let options = PipelineOptions { batch_size: 2, ..PipelineOptions::default() };
        let (num_books, _) = index_corpus(books.path(), index_dir.path(), &options).unwrap();
        assert_eq!(num_books, 5);

        let dir = FsDirectory::new(index_dir.path()).unwrap();
        let index = Index::open(&dir).unwrap();
        assert_eq!(index.total_docs, 5);
        assert!(index.segments.len() >= 3);
    }

    #[test]
    fn empty_source_directory_yields_zero_books() {
        let books = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        let (num_books, num_chunks) = index_corpus(books.path(), index_dir.path(), &PipelineOptions::default()).unwrap();
        assert_eq!(num_books, 0);
        assert_eq!(num_chunks, 0);
    }
}
