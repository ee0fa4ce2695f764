//! Document parsing and chunking (§4.8, §6).
//!
//! The three formats are a closed, extension-selected set — not an open
//! plugin interface (§9 "Dynamic dispatch").

use crate::error::{Error, Result};
use scraper::Html;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Reads a plain-text file as-is.
pub fn parse_txt(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(Error::Io)
}

/// Extracts visible text from every XHTML content document inside an EPUB
/// container, in archive order, joined with blank lines.
pub fn parse_epub(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    parse_epub_bytes(&bytes, Some(path))
}

/// Extracts text from every page of a PDF, in page order.
pub fn parse_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    parse_pdf_bytes(&bytes, Some(path))
}

/// Byte-buffer variant of [`parse_epub`], used directly by the pipeline's
/// processor stage so an already-loaded document never hits disk twice.
/// `source` is carried through only for error messages.
pub(crate) fn parse_epub_bytes(bytes: &[u8], source: Option<&Path>) -> Result<String> {
    let path_str = || source.map(|p| p.display().to_string());
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Format {
        message: format!("not a valid EPUB (zip) container: {e}"),
        path: path_str(),
    })?;

    let mut sections = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| Error::Format {
            message: format!("corrupt zip entry: {e}"),
            path: path_str(),
        })?;
        let name = entry.name().to_string();
        if !(name.ends_with(".xhtml") || name.ends_with(".html") || name.ends_with(".htm")) {
            continue;
        }
        let mut buf = String::new();
        if entry.read_to_string(&mut buf).is_err() {
            continue;
        }
        sections.push(extract_visible_text(&buf));
    }
    Ok(sections.join("\n\n"))
}

fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte-buffer variant of [`parse_pdf`]; see [`parse_epub_bytes`].
pub(crate) fn parse_pdf_bytes(bytes: &[u8], source: Option<&Path>) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| Error::Format {
        message: format!("unreadable PDF: {e}"),
        path: source.map(|p| p.display().to_string()),
    })?;
    let mut pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    pages.sort_unstable();

    let mut text = String::new();
    for page in pages {
        if let Ok(page_text) = doc.extract_text(&[page]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }
    Ok(text)
}

/// A format-tagged byte blob, as produced by the pipeline's loader stage
/// (§4.8 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Txt,
    Epub,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())?.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Dispatches to the parser matching `format`.
pub fn parse_document(path: &Path, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Txt => parse_txt(path),
        DocumentFormat::Epub => parse_epub(path),
        DocumentFormat::Pdf => parse_pdf(path),
    }
}

/// Byte-buffer dispatch used by the pipeline's processor stage, which
/// already holds the loader stage's in-memory read of `source`.
pub(crate) fn parse_document_bytes(bytes: &[u8], format: DocumentFormat, source: &Path) -> Result<String> {
    match format {
        DocumentFormat::Txt => String::from_utf8(bytes.to_vec()).map_err(|e| Error::Format {
            message: format!("not valid UTF-8: {e}"),
            path: Some(source.display().to_string()),
        }),
        DocumentFormat::Epub => parse_epub_bytes(bytes, Some(source)),
        DocumentFormat::Pdf => parse_pdf_bytes(bytes, Some(source)),
    }
}

/// Splits `text` into overlapping chunks of `size` characters with
/// `overlap` characters shared between consecutive chunks (§4.8 step 2).
/// `overlap` must be `< size`; an overlap `>= size` would never advance
/// and is clamped to `size - 1`.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if size == 0 || text.is_empty() {
        return Vec::new();
    }
    let overlap = overlap.min(size.saturating_sub(1));
    let stride = size - overlap;
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Content-hashes every file in `paths`, for the pipeline's reindex
/// skip-detection (unchanged files need no reprocessing).
pub fn file_hashes_batch(paths: &[PathBuf]) -> HashMap<PathBuf, String> {
    paths
        .iter()
        .filter_map(|path| {
            let bytes = std::fs::read(path).ok()?;
            Some((path.clone(), blake3::hash(&bytes).to_hex().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_respects_size_and_overlap() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 4, 2);
        assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij", "ij"]);
    }

    #[test]
    fn chunk_text_with_no_overlap_tiles_exactly() {
        let text = "abcdefgh";
        let chunks = chunk_text(text, 4, 0);
        assert_eq!(chunks, vec!["abcd", "efgh"]);
    }

    #[test]
    fn chunk_text_on_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn chunk_text_shorter_than_size_yields_one_chunk() {
        assert_eq!(chunk_text("ab", 10, 2), vec!["ab"]);
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_extension(Path::new("book.PDF")), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(Path::new("book.txt")), Some(DocumentFormat::Txt));
        assert_eq!(DocumentFormat::from_extension(Path::new("book.mobi")), None);
    }

    #[test]
    fn file_hashes_batch_skips_unreadable_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("a.txt");
        std::fs::write(&good, b"hello").unwrap();
        let missing = tmp.path().join("missing.txt");

        let hashes = file_hashes_batch(&[good.clone(), missing]);
        assert_eq!(hashes.len(), 1);
        assert!(hashes.contains_key(&good));
    }
}
