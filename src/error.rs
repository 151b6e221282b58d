//! Error taxonomy for the storage core, one layer at a time.
//!
//! Lower layers return their own error type; each layer above wraps the one
//! below with `#[from]` so `?` composes all the way up to [`LogError`].

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store file {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to store")]
    Append(#[source] io::Error),

    #[error("failed to read store at position {position}")]
    Read {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to flush store write buffer")]
    Flush(#[source] io::Error),

    #[error("failed to close store")]
    Close(#[source] io::Error),

    #[error("failed to serialize record")]
    Codec(#[from] bincode::error::EncodeError),

    #[error("failed to deserialize record")]
    Decode(#[from] bincode::error::DecodeError),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index file {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("end of space")]
    EndOfSpace,

    #[error("end of data")]
    EndOfData,

    #[error("index file {path} size {size} is not a multiple of the entry width")]
    Malformed { path: String, size: u64 },

    #[error("relative offset {offset} does not fit in a 32-bit index entry")]
    OffsetOverflow { offset: u64 },

    #[error("failed to map index file")]
    Mmap(#[source] io::Error),

    #[error("failed to grow index file to {target_size} bytes")]
    Grow {
        target_size: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to sync index mapping")]
    Sync(#[source] io::Error),

    #[error("failed to close index")]
    Close(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to remove segment file {path}")]
    Remove {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("offset {offset} is out of range")]
    OffsetOutOfRange { offset: u64 },

    #[error("failed to create log directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan log directory {path}")]
    ScanDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("segment file name {name} is not a valid base offset")]
    CorruptPath { name: String },

    #[error("failed to remove log directory {path}")]
    RemoveDir {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

impl From<StoreError> for LogError {
    fn from(e: StoreError) -> Self {
        LogError::Segment(SegmentError::Store(e))
    }
}

impl From<IndexError> for LogError {
    fn from(e: IndexError) -> Self {
        LogError::Segment(SegmentError::Index(e))
    }
}
