//! Persistence of compiled programs.
//!
//! A [`CacheStrategy`] maps a source template path to a stored program and
//! decides whether that program is still fresh. Two strategies exist:
//!
//! - [`DirectoryCache`] mirrors the template tree, one artifact per template.
//!   Writes target a path derived only from the source path, so concurrent
//!   writers at worst overwrite each other with identical content.
//! - [`RegistryCache`] keeps generated artifact names in one JSON registry.
//!   Concurrent flushes are serialized with a lock file and merged, but two
//!   processes compiling the same new template before either flushes still
//!   allocate two names; one artifact then leaks.
//!
//! An entry is stale when the source's size differs from the stored size or
//! its modification time is later than the stored change time.

mod directory;
mod lock;
mod registry;

pub use directory::DirectoryCache;
pub use lock::FileLock;
pub use registry::RegistryCache;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::config::{CacheConfig, CacheKind};
use crate::error::{Error, Result};
use crate::program::Program;

/// What a strategy knows about one cached template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Where the program is stored: a relative artifact path or a generated
    /// file name.
    pub cache_key: String,
    /// Source size in bytes when the program was compiled.
    pub source_size: u64,
    /// Compared against the source's modification time.
    pub source_change_time: SystemTime,
}

/// Size and modification time of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStamp {
    pub size: u64,
    pub modified: SystemTime,
}

impl SourceStamp {
    /// Reads the stamp of `path`; a missing file is
    /// [`Error::TemplateNotFound`].
    pub fn of(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => Error::TemplateNotFound(path.to_path_buf()),
            _ => Error::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let modified = meta.modified().map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            size: meta.len(),
            modified,
        })
    }
}

impl CacheEntry {
    /// Whether the entry still matches the source file.
    pub fn is_fresh(&self, stamp: &SourceStamp) -> bool {
        self.source_size == stamp.size && self.source_change_time >= stamp.modified
    }
}

/// Storage for compiled programs, keyed by source path.
///
/// Paths handed to a strategy are absolute.
pub trait CacheStrategy: fmt::Debug + Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The stored entry for `source`, fresh or not.
    fn entry(&mut self, source: &Path) -> Result<Option<CacheEntry>>;

    /// The stored entry for `source` if it is still fresh.
    fn get(&mut self, source: &Path) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.entry(source)? else {
            trace!(source = %source.display(), strategy = self.name(), "no cache entry");
            return Ok(None);
        };
        let stamp = SourceStamp::of(source)?;
        if entry.is_fresh(&stamp) {
            Ok(Some(entry))
        } else {
            trace!(source = %source.display(), strategy = self.name(), "cache entry is stale");
            Ok(None)
        }
    }

    /// Stores `program` for `source`, reusing `previous`'s location when
    /// given, and returns the new entry.
    ///
    /// `stamp` must be taken before the source was read, so an edit that
    /// lands during compilation leaves the entry stale.
    fn put(
        &mut self,
        source: &Path,
        stamp: &SourceStamp,
        previous: Option<&CacheEntry>,
        program: &Program,
    ) -> Result<CacheEntry>;

    /// Reads the program an entry points to.
    fn load(&mut self, entry: &CacheEntry) -> Result<Program>;

    /// Persists pending bookkeeping.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds the strategy selected in `config`. `template_dir` is the base for
/// directory-strategy keys.
pub fn from_config(config: &CacheConfig, template_dir: &Path) -> Result<Box<dyn CacheStrategy>> {
    Ok(match config.strategy {
        CacheKind::Directory => Box::new(DirectoryCache::new(
            &config.dir,
            template_dir,
            &config.extension,
        )),
        CacheKind::Registry => Box::new(RegistryCache::open(&config.dir, &config.registry_file)?),
    })
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory and an atomic rename. `modified` overrides the file's mtime.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], modified: Option<SystemTime>) -> Result<()> {
    use std::io::Write;

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).map_err(|e| Error::cache_io(&dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::cache_io(&dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .map_err(|e| Error::cache_io(tmp.path(), e))?;
    if let Some(modified) = modified {
        tmp.as_file()
            .set_modified(modified)
            .map_err(|e| Error::cache_io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| Error::cache_io(path, e.error))?;
    Ok(())
}
