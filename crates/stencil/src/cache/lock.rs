//! Advisory lock files.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::warn;

use crate::error::{Error, Result};

/// A lock older than this is assumed to belong to a crashed process.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

const RETRY_EVERY: Duration = Duration::from_millis(25);
const GIVE_UP_AFTER: Duration = Duration::from_secs(30);

/// An exclusively created file, removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Creates `path`, waiting while another holder has it and breaking it
    /// once it is older than [`STALE_AFTER`].
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        warn!(lock = %path.display(), "breaking stale lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed() > GIVE_UP_AFTER {
                        return Err(Error::cache_io(
                            &path,
                            io::Error::new(io::ErrorKind::TimedOut, "lock is held by another process"),
                        ));
                    }
                    thread::sleep(RETRY_EVERY);
                }
                Err(e) => return Err(Error::cache_io(&path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json.lock");

        let lock = FileLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .is_err());

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json.lock");
        let file = fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(60))
            .unwrap();
        drop(file);

        let lock = FileLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());
    }
}
