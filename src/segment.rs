//! Pairs one [`Store`] with one [`Index`] to provide record-level append
//! and read, and enforces the size caps that trigger a roll (spec §4.3).

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::SegmentConfig;
use crate::error::{IndexError, SegmentError};
use crate::index::Index;
use crate::record::Record;
use crate::store::Store;

pub struct Segment {
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Opens (or creates) the `<base_offset>.store`/`<base_offset>.index`
    /// pair under `dir` and recovers `next_offset` from the index's last
    /// entry.
    #[instrument(skip(config), fields(base_offset))]
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> Result<Self, SegmentError> {
        let store = Arc::new(Store::new(dir.join(format!("{base_offset}.store")))?);
        let index = Index::new(
            dir.join(format!("{base_offset}.index")),
            config.max_index_bytes,
        )?;

        let next_offset = match index.read_last() {
            Ok((rel_off, _)) => base_offset + rel_off as u64 + 1,
            Err(IndexError::EndOfData) => base_offset,
            Err(err) => return Err(err.into()),
        };

        info!(
            base_offset,
            next_offset,
            store_size = store.size(),
            index_entries = index.len(),
            "segment opened"
        );

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Assigns `record.offset := next_offset`, appends it, and returns the
    /// assigned absolute offset. Fails with `EndOfSpace` if the index has
    /// no room left; the store already holds the frame in that case (spec
    /// §4.3) — the log rolls to a new segment on the next append.
    #[instrument(skip(self, record))]
    pub fn append(&mut self, mut record: Record) -> Result<u64, SegmentError> {
        let offset = self.next_offset;
        record.offset = offset;

        let payload = record.encode()?;
        let (_, position) = self.store.append(&payload)?;

        let rel_off: u32 = (offset - self.base_offset)
            .try_into()
            .map_err(|_| IndexError::OffsetOverflow { offset })?;
        self.index.write(rel_off, position)?;

        self.next_offset += 1;
        debug!(offset, position, "segment append");
        Ok(offset)
    }

    /// Reads the record at absolute offset `offset`.
    #[instrument(skip(self))]
    pub fn read(&self, offset: u64) -> Result<Record, SegmentError> {
        let rel_off: u32 = (offset - self.base_offset)
            .try_into()
            .map_err(|_| IndexError::OffsetOverflow { offset })?;
        let (_, position) = self.index.read(rel_off)?;
        let payload = self.store.read(position)?;
        Ok(Record::decode(&payload)?)
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    /// True once either the store or the index has reached its cap.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes || self.index.is_maxed()
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// A cloned handle onto this segment's store, for consumers (the
    /// full-log reader) that need to read its bytes through the store's
    /// own lock without holding the segment itself (spec §5).
    pub fn store_handle(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    pub fn close(&self) -> Result<(), SegmentError> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    #[instrument(skip(self), fields(base_offset = self.base_offset))]
    pub fn remove(self) -> Result<(), SegmentError> {
        self.close()?;
        let store_path = self.store.path().to_path_buf();
        let index_path = self.index.path().to_path_buf();
        std::fs::remove_file(&store_path).map_err(|source| SegmentError::Remove {
            path: store_path.display().to_string(),
            source,
        })?;
        std::fs::remove_file(&index_path).map_err(|source| SegmentError::Remove {
            path: index_path.display().to_string(),
            source,
        })?;
        Ok(())
    }
}
