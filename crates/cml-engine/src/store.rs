//! Stat access to backing files.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

/// What a stat call reports for an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
    /// Size in bytes.
    pub size: u64,
}

/// Read-only view of the files a policy script may include.
pub trait BackingStore: Send + Sync {
    /// Stat a path. `Ok(None)` means the file does not exist.
    fn stat(&self, path: &str) -> io::Result<Option<FileStat>>;
}

/// Backing store over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackingStore;

impl BackingStore for FsBackingStore {
    fn stat(&self, path: &str) -> io::Result<Option<FileStat>> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(_) if parent_is_not_dir(Path::new(path)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Some(FileStat {
            mtime,
            size: meta.len(),
        }))
    }
}

/// Whether the nearest existing ancestor of `path` is something other than a
/// directory, so `path` cannot exist.
fn parent_is_not_dir(path: &Path) -> bool {
    path.ancestors()
        .skip(1)
        .find_map(|ancestor| std::fs::metadata(ancestor).ok())
        .is_some_and(|meta| !meta.is_dir())
}

/// In-memory backing store that records every path it was asked about.
#[derive(Debug, Default)]
pub struct RecordingStore {
    files: HashMap<String, FileStat>,
    failing: HashMap<String, io::ErrorKind>,
    queried: Mutex<Vec<String>>,
}

impl RecordingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn with_file(mut self, path: impl Into<String>, mtime: i64, size: u64) -> Self {
        self.files.insert(path.into(), FileStat { mtime, size });
        self
    }

    /// Make stat fail for a path.
    pub fn with_failure(mut self, path: impl Into<String>, kind: io::ErrorKind) -> Self {
        self.failing.insert(path.into(), kind);
        self
    }

    /// Paths queried so far, in order.
    pub fn queried(&self) -> Vec<String> {
        self.queried
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    /// Whether a path was queried.
    pub fn was_queried(&self, path: &str) -> bool {
        self.queried().iter().any(|p| p == path)
    }
}

impl BackingStore for RecordingStore {
    fn stat(&self, path: &str) -> io::Result<Option<FileStat>> {
        if let Ok(mut queried) = self.queried.lock() {
            queried.push(path.to_string());
        }
        if let Some(kind) = self.failing.get(path) {
            return Err(io::Error::from(*kind));
        }
        Ok(self.files.get(path).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_fs_store_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.html");
        std::fs::write(&path, "hello").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
            .unwrap();

        let stat = FsBackingStore.stat(&path.display().to_string()).unwrap();
        assert_eq!(
            stat,
            Some(FileStat {
                mtime: 1_700_000_000,
                size: 5
            })
        );

        let missing = dir.path().join("missing.html");
        assert_eq!(FsBackingStore.stat(&missing.display().to_string()).unwrap(), None);
    }

    #[test]
    fn test_path_under_regular_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.html"), "hello").unwrap();

        let nested = dir.path().join("a.html").join("b.html");
        assert_eq!(FsBackingStore.stat(&nested.display().to_string()).unwrap(), None);

        let deeper = dir.path().join("a.html").join("x").join("b.html");
        assert_eq!(FsBackingStore.stat(&deeper.display().to_string()).unwrap(), None);
    }

    #[test]
    fn test_recording_store() {
        let store = RecordingStore::new()
            .with_file("/c/a.html", 10, 3)
            .with_failure("/c/locked.html", io::ErrorKind::PermissionDenied);

        assert_eq!(store.stat("/c/a.html").unwrap().map(|s| s.size), Some(3));
        assert_eq!(store.stat("/c/b.html").unwrap(), None);
        assert!(store.stat("/c/locked.html").is_err());
        assert_eq!(store.queried(), vec!["/c/a.html", "/c/b.html", "/c/locked.html"]);
        assert!(!store.was_queried("/c/x.html"));
    }
}
