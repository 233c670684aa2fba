//! FileBackend - one JSON document per resource in a directory
//!
//! Writes go to a temporary file in the same directory, are fsynced, then
//! renamed over the target, so a crash leaves either the old or the new entry.
//! File names are a SHA-256 of the key so arbitrarily long source names fit
//! in one path component; the key itself is stored inside the document.

use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::backend::{Backend, Entry};
use crate::error::{Result, StoreError};

const ENTRY_EXT: &str = "json";

/// On-disk document: the entry plus the key it belongs to
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<E> {
    key: String,
    #[serde(flatten)]
    entry: E,
}

/// Directory backed registry
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) the registry directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::InvalidPath {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        if !dir.is_dir() {
            return Err(StoreError::InvalidPath {
                path: dir,
                message: "not a directory".to_string(),
            });
        }
        debug!(path = %dir.display(), "file registry opened");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }

    fn read_entry(path: &Path) -> std::io::Result<StoredEntry<Entry>> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
    }
}

impl Backend for FileBackend {
    fn load_all(&self) -> Result<Vec<(String, Entry)>> {
        let dir = fs::read_dir(&self.dir).map_err(|e| StoreError::io("<registry>", e))?;
        let mut entries = Vec::new();

        for item in dir {
            let path = match item {
                Ok(item) => item.path(),
                Err(e) => return Err(StoreError::io("<registry>", e)),
            };
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match Self::read_entry(&path) {
                Ok(stored) if file_name(&stored.key) == name => {
                    entries.push((stored.key, stored.entry));
                }
                Ok(stored) => {
                    warn!(
                        path = %path.display(),
                        key = %stored.key,
                        "skipping registry entry stored under a foreign name"
                    );
                }
                Err(e) => {
                    // Unreadable entries are dropped; the source restarts from scratch.
                    warn!(path = %path.display(), error = %e, "skipping corrupt registry entry");
                }
            }
        }

        debug!(count = entries.len(), "registry entries loaded");
        Ok(entries)
    }

    fn put(&self, key: &str, entry: &Entry) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::io(key, e))?;
        let stored = StoredEntry {
            key: key.to_string(),
            entry,
        };
        serde_json::to_writer(&mut tmp, &stored).map_err(|e| StoreError::encoding(key, e))?;
        tmp.flush().map_err(|e| StoreError::io(key, e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(key, e))?;
        tmp.persist(self.entry_path(key))
            .map_err(|e| StoreError::io(key, e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(key, e)),
        }
    }
}

/// Fixed length file name for a key
fn file_name(key: &str) -> String {
    format!("{}.{ENTRY_EXT}", hex::encode(Sha256::digest(key.as_bytes())))
}
