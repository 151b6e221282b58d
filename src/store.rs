//! Append-only frame stream over a single file (spec §4.1).
//!
//! Frames are `u64_be(len) ‖ payload`, written through a buffered writer.
//! Reads flush the writer first so a reader always observes every
//! preceding append, even if the OS hasn't otherwise synchronized the
//! buffered writer and a positional read (spec §9, "buffered store reads
//! see their own unflushed writes").

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, instrument};

use crate::error::StoreError;

const LEN_WIDTH: u64 = 8;

struct Inner {
    writer: BufWriter<File>,
    reader: File,
    size: u64,
}

/// Append-only, length-prefixed record store. All operations serialize
/// through a single internal lock (spec §5).
pub struct Store {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl Store {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Open {
                path: path.display().to_string(),
                source,
            })?;

        let size = file
            .metadata()
            .map_err(|source| StoreError::Open {
                path: path.display().to_string(),
                source,
            })?
            .len();

        let reader = file.try_clone().map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;

        debug!(size, "opened store");

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                reader,
                size,
            }),
        })
    }

    /// Appends `payload`, returning `(bytes_written, position)` where
    /// `position` is the file offset the frame starts at.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let position = inner.size;
        let len = payload.len() as u64;

        inner
            .writer
            .write_all(&len.to_be_bytes())
            .map_err(StoreError::Append)?;
        inner.writer.write_all(payload).map_err(StoreError::Append)?;

        let written = LEN_WIDTH + len;
        inner.size += written;

        debug!(position, written, "appended frame");
        Ok((written, position))
    }

    /// Reads the frame at `position`, flushing pending writes first.
    #[instrument(skip(self), fields(position))]
    pub fn read(&self, position: u64) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.writer.flush().map_err(StoreError::Flush)?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        inner
            .reader
            .read_exact_at(&mut len_buf, position)
            .map_err(|source| StoreError::Read { position, source })?;
        let len = u64::from_be_bytes(len_buf);

        let mut payload = vec![0u8; len as usize];
        inner
            .reader
            .read_exact_at(&mut payload, position + LEN_WIDTH)
            .map_err(|source| StoreError::Read { position, source })?;

        Ok(payload)
    }

    /// Positional read used by the full-log reader; flushes pending writes
    /// first for the same reason [`Store::read`] does.
    #[instrument(skip(self, buf), fields(offset))]
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.writer.flush().map_err(StoreError::Flush)?;
        inner
            .reader
            .read_at(buf, offset)
            .map_err(|source| StoreError::Read {
                position: offset,
                source,
            })
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().expect("store mutex poisoned").size
    }

    /// Flushes the write buffer without closing the file. Used before a
    /// consumer opens its own handle onto the store, e.g. the full-log
    /// reader (spec §4.4 "Reader").
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.writer.flush().map_err(StoreError::Flush)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self))]
    pub fn close(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.writer.flush().map_err(StoreError::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("0.store")).unwrap();
        (dir, store)
    }

    #[test]
    fn append_returns_position_then_reads_back() {
        let (_dir, store) = store();

        let (n1, pos1) = store.append(b"hello world").unwrap();
        assert_eq!(pos1, 0);
        assert_eq!(n1, 8 + 11);

        let (n2, pos2) = store.append(b"second record").unwrap();
        assert_eq!(pos2, n1);
        assert_eq!(n2, 8 + 13);

        assert_eq!(store.read(pos1).unwrap(), b"hello world");
        assert_eq!(store.read(pos2).unwrap(), b"second record");
        assert_eq!(store.size(), n1 + n2);
    }

    #[test]
    fn read_observes_unflushed_write() {
        let (_dir, store) = store();
        let (_, pos) = store.append(b"fresh").unwrap();
        // No explicit flush/close call before the read.
        assert_eq!(store.read(pos).unwrap(), b"fresh");
    }

    #[test]
    fn reopening_recovers_size_and_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.store");

        let pos = {
            let store = Store::new(&path).unwrap();
            let (_, pos) = store.append(b"durable").unwrap();
            store.close().unwrap();
            pos
        };

        let store = Store::new(&path).unwrap();
        assert_eq!(store.read(pos).unwrap(), b"durable");
        assert_eq!(store.size(), 8 + 7);
    }

    #[test]
    fn read_at_matches_on_disk_frame_bytes() {
        let (_dir, store) = store();
        store.append(b"abc").unwrap();

        let mut buf = [0u8; 8];
        store.read_at(&mut buf, 0).unwrap();
        assert_eq!(u64::from_be_bytes(buf), 3);
    }
}
