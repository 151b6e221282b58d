//! End-to-end tests covering the boundary scenarios from the spec: fresh
//! appends, restart recovery, rolling by store size and by index size,
//! truncation, and the full-log reader.

use std::io::Read;

use commitlog::{Config, Log, LogError, SegmentConfig};
use tempfile::TempDir;

fn log_with(max_store_bytes: u64, max_index_bytes: u64) -> (TempDir, Log) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        segment: SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        },
    };
    let log = Log::new(dir.path(), config).unwrap();
    (dir, log)
}

#[test]
fn append_and_read_on_empty_log() {
    let (_dir, log) = log_with(1024, 1024);

    let offset = log.append(b"hello world".to_vec()).unwrap();
    assert_eq!(offset, 0);
    assert_eq!(log.read(0).unwrap().value, b"hello world");

    assert!(matches!(
        log.read(1),
        Err(LogError::OffsetOutOfRange { offset: 1 })
    ));
}

#[test]
fn restart_recovers_offsets_and_contents() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        segment: SegmentConfig {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            initial_offset: 0,
        },
    };

    {
        let log = Log::new(dir.path(), config).unwrap();
        for _ in 0..3 {
            log.append(b"hello world".to_vec()).unwrap();
        }
        log.close().unwrap();
    }

    let log = Log::new(dir.path(), config).unwrap();
    assert_eq!(log.lowest_offset(), 0);
    assert_eq!(log.highest_offset(), Some(2));
    assert_eq!(log.read(2).unwrap().value, b"hello world");
}

#[test]
fn rolls_segment_when_store_fills_up() {
    // "hello world" is 11 bytes -> a 19-byte frame. A cap of 32 lets two
    // records land in the first segment before the third rolls over.
    let (_dir, log) = log_with(32, 1024);

    let o0 = log.append(b"hello world".to_vec()).unwrap();
    let o1 = log.append(b"hello world".to_vec()).unwrap();
    let o2 = log.append(b"hello world".to_vec()).unwrap();

    assert_eq!((o0, o1, o2), (0, 1, 2));
    for offset in [o0, o1, o2] {
        assert_eq!(log.read(offset).unwrap().value, b"hello world");
    }
}

#[test]
fn rolls_segment_when_index_fills_up() {
    let (_dir, log) = log_with(1024 * 1024, 3 * 12);

    for _ in 0..3 {
        log.append(b"hello world".to_vec()).unwrap();
    }
    let rolled = log.append(b"hello world".to_vec()).unwrap();
    assert_eq!(rolled, 3);
    assert_eq!(log.read(3).unwrap().value, b"hello world");
}

#[test]
fn truncate_removes_segments_below_threshold() {
    // A cap of 19 bytes holds exactly one "hello world" frame, so every
    // append rolls to its own segment and truncation has something to bite.
    let (_dir, log) = log_with(19, 1024);

    for _ in 0..3 {
        log.append(b"hello world".to_vec()).unwrap();
    }

    log.truncate(1).unwrap();

    assert!(matches!(
        log.read(0),
        Err(LogError::OffsetOutOfRange { offset: 0 })
    ));
    assert_eq!(log.read(1).unwrap().value, b"hello world");
    assert_eq!(log.read(2).unwrap().value, b"hello world");
}

#[test]
fn full_log_reader_yields_raw_frame_bytes() {
    let (_dir, log) = log_with(1024, 1024);
    log.append(b"hello world".to_vec()).unwrap();

    let mut reader = log.reader().unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();

    let len = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let payload = &buf[8..8 + len as usize];
    let record = commitlog::Record::decode(payload).unwrap();
    assert_eq!(record.value, b"hello world");
}

#[test]
fn offset_not_covered_by_any_segment_is_out_of_range() {
    let (_dir, log) = log_with(1024, 1024);
    assert!(matches!(
        log.read(0),
        Err(LogError::OffsetOutOfRange { offset: 0 })
    ));
}

#[test]
fn highest_offset_is_none_for_empty_log_with_nonzero_initial_offset() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        segment: SegmentConfig {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            initial_offset: 100,
        },
    };
    let log = Log::new(dir.path(), config).unwrap();

    assert_eq!(log.highest_offset(), None);
    assert!(matches!(
        log.read(99),
        Err(LogError::OffsetOutOfRange { offset: 99 })
    ));

    let offset = log.append(b"hello world".to_vec()).unwrap();
    assert_eq!(offset, 100);
    assert_eq!(log.highest_offset(), Some(100));
}

#[test]
fn highest_offset_is_none_after_truncating_every_record_away() {
    let (_dir, log) = log_with(19, 1024);
    for _ in 0..3 {
        log.append(b"hello world".to_vec()).unwrap();
    }

    log.truncate(3).unwrap();

    assert_eq!(log.highest_offset(), None);
    assert!(matches!(
        log.read(3),
        Err(LogError::OffsetOutOfRange { offset: 3 })
    ));
}

#[test]
fn full_log_reader_concatenates_every_segment_in_order() {
    // 19-byte cap rolls every "hello world" frame into its own segment.
    let (_dir, log) = log_with(19, 1024);
    for _ in 0..3 {
        log.append(b"hello world".to_vec()).unwrap();
    }

    let mut reader = log.reader().unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).unwrap();

    let mut cursor = &buf[..];
    for _ in 0..3 {
        let len = u64::from_be_bytes(cursor[0..8].try_into().unwrap());
        let payload = &cursor[8..8 + len as usize];
        let record = commitlog::Record::decode(payload).unwrap();
        assert_eq!(record.value, b"hello world");
        cursor = &cursor[8 + len as usize..];
    }
    assert!(cursor.is_empty());
}
