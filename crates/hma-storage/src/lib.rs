use chrono::{NaiveDateTime, Timelike};
use hma_core::AnalysisRecord;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const RECORD_PREFIX: &str = "analysis_";
const RECORD_SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error in {}: {message}", .path.display())]
    Serialization { path: PathBuf, message: String },
    #[error("record sequence exhausted after {}", .key.file_name())]
    SequenceExhausted { key: RecordKey },
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Ordering key of a stored record: second-resolution local time plus a
/// sequence number that separates records written within the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub stamp: NaiveDateTime,
    pub seq: u32,
}

impl RecordKey {
    pub fn new(stamp: NaiveDateTime) -> Self {
        Self {
            stamp: stamp.with_nanosecond(0).unwrap_or(stamp),
            seq: 0,
        }
    }

    fn successor(self) -> Result<Self, StorageError> {
        let seq = self
            .seq
            .checked_add(1)
            .ok_or(StorageError::SequenceExhausted { key: self })?;
        Ok(Self {
            stamp: self.stamp,
            seq,
        })
    }

    /// `analysis_YYYYMMDD_HHMMSS.json`, with `_NNN` before the extension
    /// once the sequence is non-zero. Zero padding keeps lexical order equal
    /// to key order below 1000 records per second.
    pub fn file_name(&self) -> String {
        let stamp = self.stamp.format(STAMP_FORMAT);
        if self.seq == 0 {
            format!("{RECORD_PREFIX}{stamp}{RECORD_SUFFIX}")
        } else {
            format!("{RECORD_PREFIX}{stamp}_{:03}{RECORD_SUFFIX}", self.seq)
        }
    }

    /// Inverse of [`RecordKey::file_name`]. Only canonical names are
    /// accepted, so no two files on disk can map to the same key.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let body = name.strip_prefix(RECORD_PREFIX)?.strip_suffix(RECORD_SUFFIX)?;
        if body.len() < STAMP_LEN || !body.is_char_boundary(STAMP_LEN) {
            return None;
        }
        let (stamp, rest) = body.split_at(STAMP_LEN);
        let stamp = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
        let seq = match rest {
            "" => 0,
            other => {
                let digits = other.strip_prefix('_')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse().ok()?
            }
        };
        let key = Self { stamp, seq };
        (key.file_name() == name).then_some(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: RecordKey,
    pub path: PathBuf,
}

/// Append-only directory of analysis records.
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    index: BTreeMap<RecordKey, PathBuf>,
}

impl HistoryStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| StorageError::io(&dir, err))?;

        let mut index = BTreeMap::new();
        let entries = fs::read_dir(&dir).map_err(|err| StorageError::io(&dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io(&dir, err))?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(RecordKey::parse_file_name) else {
                continue;
            };
            index.insert(key, entry.path());
        }

        debug!(event = "history_open", dir = %dir.display(), records = index.len());
        Ok(Self { dir, index })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<StoredEntry> {
        self.index
            .iter()
            .rev()
            .take(limit)
            .map(|(key, path)| StoredEntry {
                key: *key,
                path: path.clone(),
            })
            .collect()
    }

    /// Most recent record within the newest `limit` entries.
    pub fn latest(&self, limit: usize) -> Result<Option<AnalysisRecord>, StorageError> {
        match self.recent(limit).into_iter().next() {
            Some(entry) => self.read(&entry.path).map(Some),
            None => Ok(None),
        }
    }

    pub fn read(&self, path: &Path) -> Result<AnalysisRecord, StorageError> {
        let content = fs::read_to_string(path).map_err(|err| StorageError::io(path, err))?;
        serde_json::from_str(&content).map_err(|err| StorageError::Serialization {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Writes `record` under a key that sorts after every existing entry and
    /// returns the new file's path.
    pub fn append(&mut self, record: &AnalysisRecord) -> Result<PathBuf, StorageError> {
        let mut key = RecordKey::new(record.timestamp.naive_local());
        if let Some(last) = self.index.keys().next_back() {
            if *last >= key {
                key = last.successor()?;
            }
        }

        let mut payload =
            serde_json::to_string_pretty(record).map_err(|err| StorageError::Serialization {
                path: self.dir.join(key.file_name()),
                message: err.to_string(),
            })?;
        payload.push('\n');

        loop {
            let path = self.dir.join(key.file_name());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let written = file
                        .write_all(payload.as_bytes())
                        .and_then(|_| file.sync_all());
                    if let Err(err) = written {
                        drop(file);
                        let _ = fs::remove_file(&path);
                        return Err(StorageError::io(&path, err));
                    }
                    debug!(event = "history_append", path = %path.display(), seq = key.seq);
                    self.index.insert(key, path.clone());
                    return Ok(path);
                }
                // Another writer took this name since the directory was scanned.
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    self.index.insert(key, path);
                    key = key.successor()?;
                }
                Err(err) => return Err(StorageError::io(&path, err)),
            }
        }
    }
}
