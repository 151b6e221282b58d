//! Ordered collection of segments: routes appends/reads by absolute
//! offset, rolls segments, truncates a log prefix, and exposes a
//! full-log byte reader (spec §4.4).

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{LogError, SegmentError};
use crate::record::Record;
use crate::segment::Segment;
use crate::store::Store;

struct State {
    segments: Vec<Segment>,
    active: usize,
}

/// The top-level log object: the directory, the ordered segments, the
/// roll policy, and the read-router. All mutation takes the write side of
/// an `RwLock`; reads take the read side (spec §5).
pub struct Log {
    dir: PathBuf,
    config: Config,
    state: RwLock<State>,
}

impl Log {
    /// Scans `dir` for `<base_offset>.store`/`.index` pairs, opens one
    /// segment per base offset, and bootstraps a fresh segment at
    /// `config.segment.initial_offset` if none exist.
    #[instrument(skip(config), fields(dir = %dir.as_ref().display()))]
    pub fn new(dir: impl AsRef<Path>, config: Config) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| LogError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;

        let mut base_offsets = scan_base_offsets(&dir)?;
        base_offsets.sort_unstable();
        base_offsets.dedup();

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(&dir, base_offset, config.segment)?);
        }

        if segments.is_empty() {
            segments.push(Segment::open(&dir, config.segment.initial_offset, config.segment)?);
        }

        let active = segments.len() - 1;
        info!(segments = segments.len(), "log opened");

        Ok(Self {
            dir,
            config,
            state: RwLock::new(State { segments, active }),
        })
    }

    /// Appends `value`, returning the assigned absolute offset. Rolls to a
    /// fresh segment *after* the append that first observes `is_maxed`
    /// (spec §4.4 "Roll policy rationale") so every segment holds at
    /// least one record and the triggering append is never lost.
    #[instrument(skip(self, value), fields(len = value.len()))]
    pub fn append(&self, value: Vec<u8>) -> Result<u64, LogError> {
        let mut state = self.state.write().expect("log lock poisoned");

        let record = Record { value, offset: 0 };
        let active = state.active;
        let offset = state.segments[active].append(record)?;

        if state.segments[state.active].is_maxed() {
            let base_offset = state.segments[state.active].next_offset();
            debug!(base_offset, "active segment maxed, rolling");
            let segment = Segment::open(&self.dir, base_offset, self.config.segment)?;
            state.segments.push(segment);
            state.active = state.segments.len() - 1;
        }

        Ok(offset)
    }

    /// Reads the record at `offset`, or `OffsetOutOfRange` if no segment
    /// contains it.
    #[instrument(skip(self))]
    pub fn read(&self, offset: u64) -> Result<Record, LogError> {
        let state = self.state.read().expect("log lock poisoned");

        let segment = state
            .segments
            .iter()
            .find(|s| s.contains_offset(offset))
            .ok_or(LogError::OffsetOutOfRange { offset })?;

        match segment.read(offset) {
            Ok(record) => Ok(record),
            Err(SegmentError::Index(crate::error::IndexError::EndOfData)) => {
                Err(LogError::OffsetOutOfRange { offset })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn lowest_offset(&self) -> u64 {
        let state = self.state.read().expect("log lock poisoned");
        state.segments.first().expect("log always has a segment").base_offset()
    }

    /// Highest assigned offset, or `None` if the log has no records yet
    /// (spec §9's Open Question: callers must not call this on an empty
    /// log and expect a meaningful answer, so it returns `Option`).
    pub fn highest_offset(&self) -> Option<u64> {
        let state = self.state.read().expect("log lock poisoned");
        let active = &state.segments[state.active];
        let next = active.next_offset();
        if next == active.base_offset() {
            return None;
        }
        next.checked_sub(1)
    }

    /// Deletes every segment whose highest offset is strictly below
    /// `lowest`, retaining the rest in order.
    #[instrument(skip(self))]
    pub fn truncate(&self, lowest: u64) -> Result<(), LogError> {
        let mut state = self.state.write().expect("log lock poisoned");

        let mut kept = Vec::with_capacity(state.segments.len());
        for segment in std::mem::take(&mut state.segments) {
            if segment.next_offset().saturating_sub(1) < lowest {
                info!(base_offset = segment.base_offset(), "truncating segment");
                segment.remove()?;
            } else {
                kept.push(segment);
            }
        }

        if kept.is_empty() {
            kept.push(Segment::open(&self.dir, lowest, self.config.segment)?);
        }

        state.active = kept.len() - 1;
        state.segments = kept;
        Ok(())
    }

    /// A reader over the exact on-disk bytes of every retained segment's
    /// store, concatenated in segment order. Reads go through each
    /// store's own `read_at`, so they serialize with that store's lock
    /// (spec §5) instead of racing a raw file handle against it.
    #[instrument(skip(self))]
    pub fn reader(&self) -> Result<Reader, LogError> {
        let state = self.state.read().expect("log lock poisoned");
        let stores = state
            .segments
            .iter()
            .map(|segment| {
                let store = segment.store_handle();
                let size = store.size();
                (store, size)
            })
            .collect();
        Ok(Reader {
            stores,
            current: 0,
            pos: 0,
        })
    }

    pub fn close(&self) -> Result<(), LogError> {
        let state = self.state.read().expect("log lock poisoned");
        for segment in &state.segments {
            segment.close()?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove(self) -> Result<(), LogError> {
        {
            let mut state = self.state.write().expect("log lock poisoned");
            for segment in std::mem::take(&mut state.segments) {
                segment.remove()?;
            }
        }
        fs::remove_dir(&self.dir).map_err(|source| LogError::RemoveDir {
            path: self.dir.display().to_string(),
            source,
        })
    }
}

fn scan_base_offsets(dir: &Path) -> Result<Vec<u64>, LogError> {
    let mut base_offsets = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| LogError::ScanDir {
        path: dir.display().to_string(),
        source,
    })? {
        let entry = entry.map_err(|source| LogError::ScanDir {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let is_segment_file = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("store") | Some("index")
        );
        if !is_segment_file {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LogError::CorruptPath {
                name: path.display().to_string(),
            })?;
        let base_offset: u64 = stem.parse().map_err(|_| LogError::CorruptPath {
            name: path.display().to_string(),
        })?;
        base_offsets.push(base_offset);
    }
    Ok(base_offsets)
}

/// Concatenates the on-disk bytes of every retained segment's store, in
/// segment order, as a single byte stream (spec §4.4 "Reader"). Each
/// store's size is captured when the reader is built, so later appends
/// don't extend what an in-flight scan sees.
pub struct Reader {
    stores: Vec<(Arc<Store>, u64)>,
    current: usize,
    pos: u64,
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current < self.stores.len() {
            let (store, size) = &self.stores[self.current];
            if self.pos >= *size {
                self.current += 1;
                self.pos = 0;
                continue;
            }

            let remaining = *size - self.pos;
            let want = buf.len().min(remaining as usize);
            let n = store
                .read_at(&mut buf[..want], self.pos)
                .map_err(io::Error::other)?;
            if n == 0 {
                self.current += 1;
                self.pos = 0;
                continue;
            }
            self.pos += n as u64;
            return Ok(n);
        }
        Ok(0)
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(?err, "failed to close log on drop");
        }
    }
}
