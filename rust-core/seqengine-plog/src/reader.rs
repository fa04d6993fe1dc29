// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reading committed events back from segment files.
//
// CRC32 checksums are verified on each entry. Corrupted entries are skipped
// with a warning and a truncated tail (crash mid-write) ends the segment
// quietly.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::entry::{self, HEADER_PREFIX_SIZE, MAX_ENTRY_SIZE};
use crate::error::{PLogError, PLogResult};
use crate::event::PLogEvent;
use crate::ids::Offset;
use crate::log::ReadLimit;
use crate::segment::list_segments;

/// Read the events of a partition directory with `offset >= from`, in
/// offset order, stopping once `limit` events have been collected.
pub fn read_partition(dir: &Path, from: Offset, limit: ReadLimit) -> PLogResult<Vec<PLogEvent>> {
    let segments = list_segments(dir)?;
    let mut events = Vec::new();

    for (index, segment) in segments.iter().enumerate() {
        // A segment only holds offsets below the start of its successor.
        if let Some(next) = segments.get(index + 1) {
            if next.start_offset <= from.0 {
                continue;
            }
        }

        for event in read_segment_events(&segment.path)? {
            if event.offset < from {
                continue;
            }
            if limit.reached(events.len()) {
                break;
            }
            events.push(event);
        }
        if limit.reached(events.len()) {
            break;
        }
    }

    events.sort_by_key(|event| event.offset);
    debug!(
        count = events.len(),
        from = from.0,
        dir = %dir.display(),
        "Read PLog events"
    );
    Ok(events)
}

/// Read every valid event of a single segment file.
pub fn read_segment_events(path: &Path) -> PLogResult<Vec<PLogEvent>> {
    Ok(scan_segment(path)?.0)
}

/// Like [`read_segment_events`], also returning the byte length of the
/// readable prefix. Anything past it is a torn or garbage tail.
pub(crate) fn scan_segment(path: &Path) -> PLogResult<(Vec<PLogEvent>, u64)> {
    let data = fs::read(path)?;
    let segment = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    let mut events = Vec::new();
    let mut pos = 0usize;

    while pos + HEADER_PREFIX_SIZE <= data.len() {
        let entry_length = u32::from_le_bytes([
            data[pos],
            data[pos + 1],
            data[pos + 2],
            data[pos + 3],
        ]);

        if entry_length == 0 {
            break;
        }
        if entry_length > MAX_ENTRY_SIZE {
            warn!(
                pos,
                entry_length,
                segment = %segment,
                "Entry declares unreasonable length, stopping segment read"
            );
            break;
        }

        let entry_end = pos + 4 + entry_length as usize;
        if entry_end > data.len() {
            debug!(
                pos,
                entry_length,
                segment = %segment,
                "Truncated entry at end of segment (expected after crash)"
            );
            break;
        }

        match entry::decode(&data[pos + 4..entry_end], entry_length) {
            Ok(event) => events.push(event),
            Err(PLogError::CrcMismatch {
                offset,
                expected,
                actual,
            }) => {
                warn!(
                    offset,
                    expected = format!("{expected:#010x}"),
                    actual = format!("{actual:#010x}"),
                    pos,
                    segment = %segment,
                    "Skipping corrupted PLog entry (CRC mismatch)"
                );
            }
            Err(other) => {
                warn!(error = %other, pos, segment = %segment, "Skipping unreadable PLog entry");
            }
        }

        pos = entry_end;
    }

    Ok((events, pos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Cud, DocCategory};
    use crate::ids::{RecordId, WorkspaceId};
    use crate::writer::{PLogWriter, SyncMode};
    use tempfile::TempDir;

    fn write_events(dir: &Path, count: u64, max_segment_size: u64) {
        let mut writer = PLogWriter::open_with_max_size(dir, SyncMode::Fsync, max_segment_size)
            .unwrap();
        for offset in 1..=count {
            let event = PLogEvent::new(Offset(offset), WorkspaceId(offset % 3), Offset(offset))
                .with_cud(Cud::create(RecordId(offset), DocCategory::ORecord));
            writer.append(&event).unwrap();
        }
    }

    #[test]
    fn test_read_from_offset_inclusive() {
        let dir = TempDir::new().unwrap();
        write_events(dir.path(), 10, 1 << 20);

        let events = read_partition(dir.path(), Offset(5), ReadLimit::ToTheEnd).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0].offset, Offset(5));
        assert_eq!(events[5].offset, Offset(10));
    }

    #[test]
    fn test_read_with_count_limit() {
        let dir = TempDir::new().unwrap();
        write_events(dir.path(), 10, 1 << 20);

        let events = read_partition(dir.path(), Offset(3), ReadLimit::Count(2)).unwrap();
        let offsets: Vec<u64> = events.iter().map(|e| e.offset.0).collect();
        assert_eq!(offsets, vec![3, 4]);
    }

    #[test]
    fn test_read_across_rotated_segments() {
        let dir = TempDir::new().unwrap();
        write_events(dir.path(), 20, 128);
        assert!(list_segments(dir.path()).unwrap().len() > 1);

        let all = read_partition(dir.path(), Offset::FIRST, ReadLimit::ToTheEnd).unwrap();
        assert_eq!(all.len(), 20);
        for (i, event) in all.iter().enumerate() {
            assert_eq!(event.offset, Offset(i as u64 + 1));
        }

        let tail = read_partition(dir.path(), Offset(18), ReadLimit::ToTheEnd).unwrap();
        assert_eq!(tail.len(), 3);
    }

    #[test]
    fn test_corrupted_entry_skipped() {
        let dir = TempDir::new().unwrap();
        write_events(dir.path(), 3, 1 << 20);

        let segments = list_segments(dir.path()).unwrap();
        let mut data = fs::read(&segments[0].path).unwrap();
        let first_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        data[4 + first_len + 4] ^= 0xFF;
        fs::write(&segments[0].path, &data).unwrap();

        let events = read_partition(dir.path(), Offset::FIRST, ReadLimit::ToTheEnd).unwrap();
        let offsets: Vec<u64> = events.iter().map(|e| e.offset.0).collect();
        assert_eq!(offsets, vec![1, 3]);
    }

    #[test]
    fn test_truncated_tail_ignored() {
        let dir = TempDir::new().unwrap();
        write_events(dir.path(), 2, 1 << 20);

        let segments = list_segments(dir.path()).unwrap();
        let mut data = fs::read(&segments[0].path).unwrap();
        data.truncate(data.len() - 5);
        fs::write(&segments[0].path, &data).unwrap();

        let (events, valid_len) = scan_segment(&segments[0].path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].offset, Offset(1));

        let first_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as u64;
        assert_eq!(valid_len, 4 + first_len);
    }
}
