//! Generated artifact names tracked in a JSON registry.
//!
//! The registry file maps absolute source paths to records:
//!
//! ```json
//! {
//!   "/srv/views/home.html": {
//!     "generated_file_name": "01hv6z8x4j3q2t1n0m9k8j7h6g.json",
//!     "size": 512,
//!     "change_time": 1718000000000000000
//!   }
//! }
//! ```
//!
//! `change_time` is the source modification time in nanoseconds since the
//! Unix epoch. The registry is read once when the cache is opened, updated in
//! memory, and written back on [`flush`](CacheStrategy::flush) or drop when
//! something changed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::cache::{write_atomic, CacheEntry, CacheStrategy, FileLock, SourceStamp};
use crate::error::{Error, Result};
use crate::program::Program;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Record {
    generated_file_name: String,
    size: u64,
    change_time: u64,
}

type Records = BTreeMap<String, Record>;

#[derive(Debug)]
pub struct RegistryCache {
    dir: PathBuf,
    registry_path: PathBuf,
    records: Records,
    dirty: bool,
}

impl RegistryCache {
    /// Opens the registry in `dir`, starting empty if the file does not exist.
    pub fn open(dir: impl Into<PathBuf>, registry_file: &str) -> Result<Self> {
        let dir = dir.into();
        let registry_path = dir.join(registry_file);
        let records = read_records(&registry_path)?;
        debug!(registry = %registry_path.display(), entries = records.len(), "opened cache registry");
        Ok(Self {
            dir,
            registry_path,
            records,
            dirty: false,
        })
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// Whether there are changes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.registry_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}

impl CacheStrategy for RegistryCache {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn entry(&mut self, source: &Path) -> Result<Option<CacheEntry>> {
        Ok(self
            .records
            .get(&source_key(source))
            .map(|record| CacheEntry {
                cache_key: record.generated_file_name.clone(),
                source_size: record.size,
                source_change_time: UNIX_EPOCH + Duration::from_nanos(record.change_time),
            }))
    }

    fn put(
        &mut self,
        source: &Path,
        stamp: &SourceStamp,
        previous: Option<&CacheEntry>,
        program: &Program,
    ) -> Result<CacheEntry> {
        let key = source_key(source);
        let generated_file_name = match (previous, self.records.get(&key)) {
            (Some(entry), _) => entry.cache_key.clone(),
            (None, Some(record)) => record.generated_file_name.clone(),
            (None, None) => format!("{}.json", Ulid::new().to_string().to_lowercase()),
        };

        let path = self.dir.join(&generated_file_name);
        let body = program.to_json().map_err(|e| Error::cache_format(&path, e))?;
        write_atomic(&path, body.as_bytes(), None)?;

        let change_time = nanos_since_epoch(stamp.modified);
        self.records.insert(
            key,
            Record {
                generated_file_name: generated_file_name.clone(),
                size: stamp.size,
                change_time,
            },
        );
        self.dirty = true;
        debug!(source = %source.display(), artifact = %path.display(), "wrote cache artifact");

        Ok(CacheEntry {
            cache_key: generated_file_name,
            source_size: stamp.size,
            source_change_time: UNIX_EPOCH + Duration::from_nanos(change_time),
        })
    }

    fn load(&mut self, entry: &CacheEntry) -> Result<Program> {
        let path = self.dir.join(&entry.cache_key);
        let body = fs::read_to_string(&path).map_err(|e| Error::cache_io(&path, e))?;
        Program::from_json(&body).map_err(|e| Error::cache_format(&path, e))
    }

    /// Merges the in-memory records into the registry file under a lock.
    /// Records written by other processes for sources this process never
    /// touched are kept.
    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| Error::cache_io(&self.dir, e))?;
        let _lock = FileLock::acquire(self.lock_path())?;

        let mut merged = read_records(&self.registry_path)?;
        for (key, record) in &self.records {
            if let Some(theirs) = merged.get(key) {
                if theirs.generated_file_name != record.generated_file_name {
                    warn!(
                        source = %key,
                        ours = %record.generated_file_name,
                        theirs = %theirs.generated_file_name,
                        "registry entry was written concurrently; keeping ours"
                    );
                }
            }
            merged.insert(key.clone(), record.clone());
        }

        let json = serde_json::to_string_pretty(&merged)
            .map_err(|e| Error::cache_format(&self.registry_path, e))?;
        write_atomic(&self.registry_path, json.as_bytes(), None)?;
        debug!(registry = %self.registry_path.display(), entries = merged.len(), "flushed cache registry");

        self.records = merged;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for RegistryCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(registry = %self.registry_path.display(), error = %e, "failed to flush cache registry");
        }
    }
}

fn source_key(source: &Path) -> String {
    source.to_string_lossy().into_owned()
}

fn nanos_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn read_records(path: &Path) -> Result<Records> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Records::new()),
        Ok(text) => serde_json::from_str(&text).map_err(|e| Error::cache_format(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Records::new()),
        Err(e) => Err(Error::cache_io(path, e)),
    }
}
