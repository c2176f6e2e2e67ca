//! Where finished request records go.
//!
//! Persisting happens from a drop guard, so the trait is synchronous.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to serialize request record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write request record to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait RecordSink: Send + Sync {
    /// `key` is `<lower(prefix)>_<uuid>`; `document` the full persisted record.
    fn persist(&self, key: &str, document: &Value) -> Result<(), SinkError>;
}

/// One `<dir>/<key>.crl` JSON file per record.
#[derive(Debug, Clone)]
pub struct FileRecordSink {
    dir: PathBuf,
}

impl FileRecordSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.crl"))
    }
}

impl RecordSink for FileRecordSink {
    fn persist(&self, key: &str, document: &Value) -> Result<(), SinkError> {
        let path = self.path_for(key);
        let bytes = serde_json::to_vec(document)?;

        write_private(&path, &bytes).map_err(|source| SinkError::Write { path, source })
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}

/// Keeps records in memory; handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<(String, Value)>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, Value)> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn find(&self, key: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }
}

impl RecordSink for MemoryRecordSink {
    fn persist(&self, key: &str, document: &Value) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((key.to_string(), document.clone()));
        Ok(())
    }
}
