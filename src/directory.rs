//! Filesystem access for segments, the WAL, and `index.json`.
//!
//! A small trait boundary (rather than calling `std::fs` directly
//! throughout the crate) keeps segment/WAL code testable against an
//! in-memory backend and leaves room for a future non-local backend
//! without touching callers.

use crate::error::Result;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait Directory: Send + Sync {
    fn create_file(&self, path: &str) -> Result<File>;
    fn open_file(&self, path: &str) -> Result<File>;
    fn append_file(&self, path: &str) -> Result<File>;
    fn exists(&self, path: &str) -> bool;
    fn remove_dir_all(&self, path: &str) -> Result<()>;
    fn create_dir_all(&self, path: &str) -> Result<()>;
    fn list_dir(&self, path: &str) -> Result<Vec<String>>;
    fn resolve(&self, path: &str) -> PathBuf;
}

pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> Result<File> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(full)?)
    }

    fn open_file(&self, path: &str) -> Result<File> {
        Ok(File::open(self.resolve(path))?)
    }

    fn append_file(&self, path: &str) -> Result<File> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new().create(true).append(true).open(full)?)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        if full.exists() {
            fs::remove_dir_all(full)?;
        }
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        if !full.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(full)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

/// Writes `data` to `path` via a temp-file-then-rename so a reader never
/// observes a partially-written file. Used for `meta.json`, the segment
/// commit marker.
pub fn atomic_write(dir: &impl Directory, path: &str, data: &[u8]) -> Result<()> {
    let tmp_path = format!("{path}.tmp");
    {
        let mut tmp = dir.create_file(&tmp_path)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        tmp.sync_data()?;
    }
    fs::rename(dir.resolve(&tmp_path), dir.resolve(path))?;
    Ok(())
}
