//! Per-(source, account) keyed record stores and the reconciliation merge.
//!
//! A store is a JSON array of records on disk and a `BTreeMap<id, Record>`
//! in memory. Lifecycle per refresh cycle: load-if-exists, merge newly
//! extracted records (new id inserts, existing id overwrites), write back
//! wholesale. There are no partial or streaming writes; the file is
//! replaced atomically via a temp file plus rename in the same directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::Record;

/// A store write failure risks silent data loss, so it is fatal to the
/// unit's cycle and surfaced to the operator — never swallowed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store {path} is not valid JSON: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Distinguishes "persisted a store" from "there was nothing to persist".
///
/// An entirely empty merge result (no existing records, no new ones) writes
/// no file at all, so callers can report "no data found" instead of
/// producing an empty artifact.
#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Persisted(PathBuf),
    NothingToPersist,
}

/// The persisted record collection for one (source, account) pair.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: BTreeMap<String, Record>,
}

impl RecordStore {
    /// Load a store from disk. A missing file is an empty store, not an
    /// error; a present-but-corrupt file is a [`PersistenceError`].
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let records = match fs::read(path) {
            Ok(bytes) => {
                let list: Vec<Record> =
                    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Decode {
                        path: path.to_path_buf(),
                        source,
                    })?;
                list.into_iter()
                    .map(|rec| (rec.id().to_string(), rec))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Union newly extracted records into the store. Absent id: insert.
    /// Present id: overwrite — the latest extraction supersedes what was
    /// stored. Returns how many ids were not previously present.
    pub fn merge(&mut self, new_records: impl IntoIterator<Item = Record>) -> usize {
        let mut inserted = 0;
        for rec in new_records {
            if self
                .records
                .insert(rec.id().to_string(), rec)
                .is_none()
            {
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full store back, replacing the file wholesale.
    ///
    /// Writes to a temp file in the destination directory first, then
    /// renames over the store path so a crash mid-write never leaves a
    /// truncated store behind.
    pub fn persist(&self) -> Result<MergeOutcome, PersistenceError> {
        if self.records.is_empty() {
            return Ok(MergeOutcome::NothingToPersist);
        }

        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;

        let list: Vec<&Record> = self.records.values().collect();
        let json = serde_json::to_vec_pretty(&list).map_err(|source| PersistenceError::Decode {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;
        tmp.write_all(&json).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        tmp.persist(&self.path)
            .map_err(|err| PersistenceError::Write {
                path: self.path.clone(),
                source: err.error,
            })?;

        Ok(MergeOutcome::Persisted(self.path.clone()))
    }
}
