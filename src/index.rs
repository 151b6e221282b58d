//! Fixed-width, memory-mapped mapping from relative offset to store
//! position (spec §4.2). Entries are append-only and 12 bytes wide:
//! a 4-byte big-endian relative offset followed by an 8-byte big-endian
//! store position.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, instrument, warn};

use crate::error::IndexError;

const OFFSET_WIDTH: u64 = 4;
const POSITION_WIDTH: u64 = 8;
const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

pub struct Index {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
    /// Bytes in use, always a multiple of `ENTRY_WIDTH`.
    size: u64,
    max_bytes: u64,
}

impl Index {
    /// Opens or creates the index at `path`, pre-sizing the file to
    /// `max_bytes` before mapping it — the mapping cannot be resized while
    /// live, so the file must be pre-sized (spec §9).
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn new(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| IndexError::Open {
                path: path.display().to_string(),
                source,
            })?;

        let existing_len = file
            .metadata()
            .map_err(|source| IndexError::Open {
                path: path.display().to_string(),
                source,
            })?
            .len();

        if existing_len % ENTRY_WIDTH != 0 {
            return Err(IndexError::Malformed {
                path: path.display().to_string(),
                size: existing_len,
            });
        }

        file.set_len(max_bytes).map_err(|source| IndexError::Grow {
            target_size: max_bytes,
            source,
        })?;

        let mmap = unsafe { MmapOptions::new().map_mut(&file).map_err(IndexError::Mmap)? };

        debug!(size = existing_len, max_bytes, "opened index");

        Ok(Self {
            file,
            mmap,
            path,
            size: existing_len,
            max_bytes,
        })
    }

    /// Appends `(rel_off, pos)`. Fails with `EndOfSpace` when the mapping
    /// has no room for another entry.
    #[instrument(skip(self), fields(rel_off, pos))]
    pub fn write(&mut self, rel_off: u32, pos: u64) -> Result<(), IndexError> {
        if self.size + ENTRY_WIDTH > self.mmap.len() as u64 {
            return Err(IndexError::EndOfSpace);
        }

        let start = self.size as usize;
        self.mmap[start..start + OFFSET_WIDTH as usize].copy_from_slice(&rel_off.to_be_bytes());
        self.mmap[start + OFFSET_WIDTH as usize..start + ENTRY_WIDTH as usize]
            .copy_from_slice(&pos.to_be_bytes());
        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Reads entry `n`, returning `(rel_off, pos)`.
    #[instrument(skip(self), fields(n))]
    pub fn read(&self, n: u32) -> Result<(u32, u64), IndexError> {
        if self.size == 0 {
            return Err(IndexError::EndOfData);
        }

        let base = n as u64 * ENTRY_WIDTH;
        if self.size < base + ENTRY_WIDTH {
            return Err(IndexError::EndOfData);
        }

        let start = base as usize;
        let rel_off = u32::from_be_bytes(
            self.mmap[start..start + OFFSET_WIDTH as usize]
                .try_into()
                .expect("slice is OFFSET_WIDTH bytes"),
        );
        let pos = u64::from_be_bytes(
            self.mmap[start + OFFSET_WIDTH as usize..start + ENTRY_WIDTH as usize]
                .try_into()
                .expect("slice is POSITION_WIDTH bytes"),
        );

        Ok((rel_off, pos))
    }

    /// Reads the last written entry, or `EndOfData` if the index is empty.
    pub fn read_last(&self) -> Result<(u32, u64), IndexError> {
        if self.size == 0 {
            return Err(IndexError::EndOfData);
        }
        let last = (self.size / ENTRY_WIDTH) - 1;
        self.read(last as u32)
    }

    /// Number of entries currently in use.
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Bytes in use (not the mapping's pre-sized length).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_maxed(&self) -> bool {
        self.size >= self.max_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Async-msyncs the mapping, fsyncs the file, truncates it to the
    /// in-use size, and closes it (spec §4.2).
    #[instrument(skip(self))]
    pub fn close(&self) -> Result<(), IndexError> {
        self.mmap.flush_async().map_err(IndexError::Sync)?;
        self.file.sync_all().map_err(IndexError::Close)?;
        self.file
            .set_len(self.size)
            .map_err(|source| IndexError::Grow {
                target_size: self.size,
                source,
            })?;
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(?err, path = %self.path.display(), "failed to close index on drop");
        }
    }
}
