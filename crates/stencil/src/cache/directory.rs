//! One artifact per template, mirroring the template tree.
//!
//! `views/users/list.html` under template dir `views` is cached as
//! `<cache dir>/users/list.html.tpl.json`. The artifact's first line is a JSON
//! header recording the source size; the rest is the program. The artifact's
//! own modification time serves as the stored change time and is set to the
//! source's modification time as seen before compiling.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{write_atomic, CacheEntry, CacheStrategy, SourceStamp};
use crate::error::{Error, Result};
use crate::program::Program;

/// First key segment for sources outside the template directory.
pub const EXTERNAL: &str = "_external";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    size: u64,
}

#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
    template_dir: PathBuf,
    extension: String,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>, template_dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            template_dir: template_dir.into(),
            extension: extension.to_string(),
        }
    }

    /// The cache key for `source`: its path relative to the template
    /// directory with the cache extension appended (`users/list.html` keys as
    /// `users/list.html.tpl.json`).
    ///
    /// Sources outside the template directory are keyed by their absolute
    /// path under the [`EXTERNAL`] segment. A relative key whose first segment
    /// starts with `_` gets one more `_`, so the two kinds never meet.
    pub fn key_for(&self, source: &Path) -> String {
        let (relative, external) = match source.strip_prefix(&self.template_dir) {
            Ok(relative) => (relative, false),
            Err(_) => (source, true),
        };
        let mut parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if external {
            parts.insert(0, EXTERNAL.to_string());
        } else if let Some(first) = parts.first_mut().filter(|p| p.starts_with('_')) {
            first.insert(0, '_');
        }
        let mut key = parts.join("/");
        key.push_str(&self.extension);
        key
    }

    /// Where the artifact for `key` lives.
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }

    fn read_header(&self, path: &Path) -> Result<Option<Header>> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::cache_io(path, e)),
        };
        let mut line = String::new();
        BufReader::new(file)
            .read_line(&mut line)
            .map_err(|e| Error::cache_io(path, e))?;
        serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|e| Error::cache_format(path, format!("bad header: {}", e)))
    }
}

impl CacheStrategy for DirectoryCache {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn entry(&mut self, source: &Path) -> Result<Option<CacheEntry>> {
        let key = self.key_for(source);
        let path = self.artifact_path(&key);
        let Some(header) = self.read_header(&path)? else {
            return Ok(None);
        };
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| Error::cache_io(&path, e))?;
        Ok(Some(CacheEntry {
            cache_key: key,
            source_size: header.size,
            source_change_time: modified,
        }))
    }

    fn put(
        &mut self,
        source: &Path,
        stamp: &SourceStamp,
        _previous: Option<&CacheEntry>,
        program: &Program,
    ) -> Result<CacheEntry> {
        let key = self.key_for(source);
        let path = self.artifact_path(&key);

        let header = serde_json::to_string(&Header { size: stamp.size })
            .map_err(|e| Error::cache_format(&path, e))?;
        let body = program.to_json().map_err(|e| Error::cache_format(&path, e))?;
        write_atomic(
            &path,
            format!("{}\n{}", header, body).as_bytes(),
            Some(stamp.modified),
        )?;

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| Error::cache_io(&path, e))?;
        debug!(source = %source.display(), artifact = %path.display(), "wrote cache artifact");
        Ok(CacheEntry {
            cache_key: key,
            source_size: stamp.size,
            source_change_time: modified,
        })
    }

    fn load(&mut self, entry: &CacheEntry) -> Result<Program> {
        let path = self.artifact_path(&entry.cache_key);
        let mut reader = BufReader::new(fs::File::open(&path).map_err(|e| Error::cache_io(&path, e))?);
        let mut header = String::new();
        reader
            .read_line(&mut header)
            .map_err(|e| Error::cache_io(&path, e))?;
        let mut body = String::new();
        reader
            .read_to_string(&mut body)
            .map_err(|e| Error::cache_io(&path, e))?;
        Program::from_json(&body).map_err(|e| Error::cache_format(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Instruction;
    use std::time::{Duration, SystemTime};

    fn stamp(path: &Path) -> SourceStamp {
        SourceStamp::of(path).unwrap()
    }

    fn setup() -> (tempfile::TempDir, DirectoryCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(
            dir.path().join("cache"),
            dir.path().join("views"),
            ".tpl.json",
        );
        fs::create_dir_all(dir.path().join("views/users")).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_key_mirrors_template_tree() {
        let (dir, cache) = setup();
        assert_eq!(
            cache.key_for(&dir.path().join("views/users/list.html")),
            "users/list.html.tpl.json"
        );
        assert_eq!(
            cache.key_for(&dir.path().join("views/README")),
            "README.tpl.json"
        );
        assert_eq!(
            cache.artifact_path("users/list.html.tpl.json"),
            dir.path().join("cache").join("users").join("list.html.tpl.json")
        );
    }

    #[test]
    fn test_key_keeps_source_extension() {
        let (dir, cache) = setup();
        assert_ne!(
            cache.key_for(&dir.path().join("views/home.html")),
            cache.key_for(&dir.path().join("views/home.xml"))
        );
    }

    #[test]
    fn test_key_outside_template_dir_is_separate() {
        let (dir, cache) = setup();
        let outside = cache.key_for(Path::new("/srv/other/page.html"));
        assert_eq!(outside, "_external/srv/other/page.html.tpl.json");

        let inside = cache.key_for(&dir.path().join("views/srv/other/page.html"));
        assert_eq!(inside, "srv/other/page.html.tpl.json");

        let lookalike = cache.key_for(&dir.path().join("views/_external/srv/other/page.html"));
        assert_eq!(lookalike, "__external/srv/other/page.html.tpl.json");
    }

    #[test]
    fn test_same_size_sources_do_not_share_an_artifact() {
        let (dir, mut cache) = setup();
        let html = dir.path().join("views/home.html");
        let xml = dir.path().join("views/home.xml");
        fs::write(&html, "HTML page").unwrap();
        fs::write(&xml, "XML  feed").unwrap();

        let html_program: Program = vec![Instruction::literal("HTML page")].into_iter().collect();
        cache.put(&html, &stamp(&html), None, &html_program).unwrap();

        assert_eq!(cache.get(&xml).unwrap(), None);
    }

    #[test]
    fn test_put_get_load() {
        let (dir, mut cache) = setup();
        let source = dir.path().join("views/users/list.html");
        fs::write(&source, "hello").unwrap();

        assert_eq!(cache.get(&source).unwrap(), None);

        let program: Program = vec![Instruction::literal("hello")].into_iter().collect();
        let entry = cache.put(&source, &stamp(&source), None, &program).unwrap();
        assert_eq!(entry.source_size, 5);
        assert!(dir.path().join("cache/users/list.html.tpl.json").exists());

        let fresh = cache.get(&source).unwrap().unwrap();
        assert_eq!(fresh, entry);
        assert_eq!(cache.load(&fresh).unwrap(), program);
    }

    #[test]
    fn test_size_change_is_stale() {
        let (dir, mut cache) = setup();
        let source = dir.path().join("views/a.html");
        fs::write(&source, "one").unwrap();
        cache.put(&source, &stamp(&source), None, &Program::new()).unwrap();

        fs::write(&source, "three").unwrap();
        assert_eq!(cache.get(&source).unwrap(), None);
        assert!(cache.entry(&source).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_artifact_is_cache_format() {
        let (dir, mut cache) = setup();
        let source = dir.path().join("views/a.html");
        fs::write(&source, "x").unwrap();
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("cache/a.html.tpl.json"), "not json\n[]").unwrap();

        assert!(matches!(cache.entry(&source), Err(Error::CacheFormat { .. })));
    }

    #[test]
    fn test_edit_during_compile_leaves_entry_stale() {
        let (dir, mut cache) = setup();
        let source = dir.path().join("views/a.html");
        fs::write(&source, "old").unwrap();
        let file = fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(7200)).unwrap();
        let before_read = stamp(&source);

        fs::write(&source, "new").unwrap();
        let file = fs::File::options().write(true).open(&source).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();

        let entry = cache.put(&source, &before_read, None, &Program::new()).unwrap();
        assert_eq!(entry.source_change_time, before_read.modified);
        assert_eq!(cache.get(&source).unwrap(), None);
    }
}
