//! ---
//! sc_section: "02-capabilities"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "File-access capability consumed by harness subsystems."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
//! File-access capability used by harness subsystems.
//!
//! The surface mirrors what the smoke tests exercise: open-by-path,
//! stat-size, and read-into-buffer. Close is folded into `Drop`, so a handle
//! is released exactly once on every exit path.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Shared result type for file-access operations.
pub type Result<T> = std::result::Result<T, KfileError>;

/// Errors surfaced by [`FileStore`] and [`FileHandle`] operations.
#[derive(Debug, Error)]
pub enum KfileError {
    /// The target path does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    /// Any other I/O failure while opening, sizing, or reading a file.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path the failing operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl KfileError {
    /// True when the error represents a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KfileError::NotFound(_))
    }
}

/// Open-by-path capability handed to harness subsystems.
pub trait FileStore: Send + Sync {
    /// Open the file at `path`, returning a readable handle.
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>>;
    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;
}

/// An open file. Dropping the handle releases it.
pub trait FileHandle: Send + std::fmt::Debug {
    /// Total size of the file in bytes.
    fn size(&mut self) -> Result<u64>;
    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read. A short count signals end of file.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// Production store backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileStore;

impl OsFileStore {
    /// Construct the filesystem-backed store.
    pub fn new() -> Self {
        Self
    }
}

impl FileStore for OsFileStore {
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>> {
        match File::open(path) {
            Ok(file) => Ok(Box::new(OsFileHandle {
                path: path.to_path_buf(),
                file,
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(KfileError::NotFound(path.to_path_buf()))
            }
            Err(err) => Err(KfileError::Io {
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "os"
    }
}

#[derive(Debug)]
struct OsFileHandle {
    path: PathBuf,
    file: File,
}

impl OsFileHandle {
    fn io_error(&self, source: std::io::Error) -> KfileError {
        KfileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl FileHandle for OsFileHandle {
    fn size(&mut self) -> Result<u64> {
        self.file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| self.io_error(err))
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|err| self.io_error(err))?;
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.io_error(err)),
            }
        }
        Ok(total)
    }
}

/// In-memory store, primarily for tests and single-process integration.
///
/// Tracks open/close counts and can inject stat failures or short reads so
/// callers can exercise every failure path of a consuming test.
#[derive(Clone, Default)]
pub struct MemFileStore {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_stat: Arc<AtomicBool>,
    short_reads: Arc<AtomicBool>,
}

impl MemFileStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a file at `path` with the provided contents.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let mut guard = self.files.lock().expect("file map poisoned");
        guard.insert(path.into(), contents.into());
    }

    /// Number of handles opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of handles released so far.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make subsequent `size()` calls fail.
    pub fn set_fail_stat(&self, fail: bool) {
        self.fail_stat.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent reads return one byte fewer than requested.
    pub fn set_short_reads(&self, short: bool) {
        self.short_reads.store(short, Ordering::SeqCst);
    }
}

impl FileStore for MemFileStore {
    fn open(&self, path: &Path) -> Result<Box<dyn FileHandle>> {
        let guard = self.files.lock().expect("file map poisoned");
        let Some(data) = guard.get(path) else {
            return Err(KfileError::NotFound(path.to_path_buf()));
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemFileHandle {
            path: path.to_path_buf(),
            data: data.clone(),
            fail_stat: self.fail_stat.load(Ordering::SeqCst),
            short_reads: self.short_reads.load(Ordering::SeqCst),
            closed: self.closed.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "mem"
    }
}

#[derive(Debug)]
struct MemFileHandle {
    path: PathBuf,
    data: Vec<u8>,
    fail_stat: bool,
    short_reads: bool,
    closed: Arc<AtomicUsize>,
}

impl FileHandle for MemFileHandle {
    fn size(&mut self) -> Result<u64> {
        if self.fail_stat {
            return Err(KfileError::Io {
                path: self.path.clone(),
                source: std::io::Error::other("injected stat failure"),
            });
        }
        Ok(self.data.len() as u64)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.data.len() {
            return Ok(0);
        }
        let mut count = buf.len().min(self.data.len() - start);
        if self.short_reads && count > 0 {
            count -= 1;
        }
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        Ok(count)
    }
}

impl Drop for MemFileHandle {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn os_store_opens_and_sizes_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fixture.txt");
        let mut file = File::create(&path).expect("create fixture");
        file.write_all(b"hello syscheck\n").expect("write fixture");
        drop(file);

        let store = OsFileStore::new();
        let mut handle = store.open(&path).expect("open fixture");
        assert_eq!(handle.size().expect("size"), 15);

        let mut buf = vec![0u8; 15];
        let read = handle.read_at(&mut buf, 0).expect("read");
        assert_eq!(read, 15);
        assert_eq!(&buf, b"hello syscheck\n");
    }

    #[test]
    fn os_store_reports_missing_file_as_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OsFileStore::new()
            .open(&dir.path().join("absent.txt"))
            .expect_err("absent file must not open");
        assert!(err.is_not_found());
    }

    #[test]
    fn os_store_read_never_exceeds_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("short.txt");
        std::fs::write(&path, b"abc").expect("write fixture");

        let store = OsFileStore::new();
        let mut handle = store.open(&path).expect("open");
        let size = handle.size().expect("size");

        let mut buf = vec![0u8; 64];
        let read = handle.read_at(&mut buf, 0).expect("read");
        assert!(read as u64 <= size);
        assert_eq!(read, 3);

        let read_past_end = handle.read_at(&mut buf, size + 10).expect("read past end");
        assert_eq!(read_past_end, 0);
    }

    #[test]
    fn mem_store_counts_every_release_once() {
        let store = MemFileStore::new();
        store.insert("/virtual/fixture", b"0123456789".to_vec());

        {
            let _first = store.open(Path::new("/virtual/fixture")).expect("open");
            let _second = store.open(Path::new("/virtual/fixture")).expect("open");
            assert_eq!(store.open_count(), 2);
            assert_eq!(store.close_count(), 0);
        }
        assert_eq!(store.close_count(), 2);
    }

    #[test]
    fn mem_store_failure_injection() {
        let store = MemFileStore::new();
        store.insert("/virtual/fixture", b"0123456789".to_vec());

        store.set_fail_stat(true);
        let mut handle = store.open(Path::new("/virtual/fixture")).expect("open");
        assert!(handle.size().is_err());
        drop(handle);
        store.set_fail_stat(false);

        store.set_short_reads(true);
        let mut handle = store.open(Path::new("/virtual/fixture")).expect("open");
        let mut buf = vec![0u8; 10];
        assert_eq!(handle.read_at(&mut buf, 0).expect("short read"), 9);
        drop(handle);
        assert_eq!(store.close_count(), 2);
    }
}
