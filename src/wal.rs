//! Durability for the RAM index across crashes (§4.7).
//!
//! One newline-delimited JSON record per document. Records that fail to
//! parse are silently skipped on replay — a torn tail write from a crash
//! mid-`append` must not prevent replaying everything before it.

use crate::config::WalOptions;
use crate::directory::Directory;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub id: u32,
    pub content: String,
    pub metadata: String,
    pub length: u32,
}

pub struct Wal<'d, D: Directory> {
    dir: &'d D,
    path: String,
    options: WalOptions,
}

impl<'d, D: Directory> Wal<'d, D> {
    pub fn open(dir: &'d D, path: impl Into<String>, options: WalOptions) -> Self {
        Self { dir, path: path.into(), options }
    }

    /// Serializes, writes, and flushes the user-space buffer. Only
    /// `fsync`s the data to disk when `options.fsync` is set (§9).
    pub fn append(&self, record: &WalRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.dir.append_file(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        if self.options.fsync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Replays every well-formed record, in order, skipping any line that
    /// fails to parse.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        if !self.dir.exists(&self.path) {
            return Ok(Vec::new());
        }
        let file = self.dir.open_file(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for line in reader.lines() {
            let Ok(line) = line else { continue };
            if line.is_empty() {
                continue;
            }
            if let Ok(record) = serde_json::from_str::<WalRecord>(&line) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Flushes and reopens the log with length 0, for use right after its
    /// contents have been durably sealed into a segment.
    pub fn truncate(&self) -> Result<()> {
        self.dir.create_file(&self.path)?.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FsDirectory;

    fn record(id: u32, content: &str) -> WalRecord {
        WalRecord { id, content: content.to_string(), metadata: String::new(), length: 2 }
    }

    #[test]
    fn appended_records_replay_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let wal = Wal::open(&dir, "index.wal", WalOptions::default());
        wal.append(&record(0, "a")).unwrap();
        wal.append(&record(1, "b")).unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[1].id, 1);
    }

    #[test]
    fn torn_tail_record_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let wal = Wal::open(&dir, "index.wal", WalOptions::default());
        wal.append(&record(0, "a")).unwrap();

        let mut raw = serde_json::to_vec(&record(1, "b")).unwrap();
        raw.truncate(raw.len() / 2);
        let mut file = dir.append_file("index.wal").unwrap();
        file.write_all(b"\n").unwrap();
        file.write_all(&raw).unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 0);
    }

    #[test]
    fn truncate_clears_the_log() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let wal = Wal::open(&dir, "index.wal", WalOptions::default());
        wal.append(&record(0, "a")).unwrap();
        wal.truncate().unwrap();
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn missing_wal_file_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = FsDirectory::new(tmp.path()).unwrap();
        let wal = Wal::open(&dir, "index.wal", WalOptions::default());
        assert!(wal.read_all().unwrap().is_empty());
    }
}
