// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the file partition log

use proptest::prelude::*;
use seqengine_plog::segment::partition_dir;
use seqengine_plog::{
    Cud, DocCategory, FilePLog, Offset, PLogEvent, PLogReader, PLogWriter, PartitionId,
    ReadLimit, RecordId, SyncMode, WorkspaceId,
};
use tempfile::TempDir;

const PID: PartitionId = PartitionId(3);

fn event(offset: u64) -> PLogEvent {
    PLogEvent::new(Offset(offset), WorkspaceId(offset % 4 + 1), Offset(offset))
        .with_cud(Cud::create(RecordId(offset), DocCategory::WRecord))
}

async fn visited(log: &FilePLog, from: Offset, limit: ReadLimit) -> Vec<u64> {
    let mut seen = Vec::new();
    log.read_plog(PID, from, limit, &mut |e| {
        seen.push(e.offset.0);
        Ok(())
    })
    .await
    .unwrap();
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_replay_visits_exactly_the_tail(
        count in 1u64..60,
        from in 1u64..70,
        max_segment_size in 96u64..2048,
    ) {
        let dir = TempDir::new().unwrap();
        let log = FilePLog::new(dir.path());
        {
            let mut writer = PLogWriter::open_with_max_size(
                partition_dir(log.root(), PID),
                SyncMode::Async,
                max_segment_size,
            )
            .unwrap();
            for offset in 1..=count {
                writer.append(&event(offset)).unwrap();
            }
        }

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let seen = runtime.block_on(visited(&log, Offset(from), ReadLimit::ToTheEnd));
        let expected: Vec<u64> = (from..=count).collect();
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn test_reopened_writer_continues_after_last_offset(
        first in 1u64..20,
        second in 1u64..20,
    ) {
        let dir = TempDir::new().unwrap();
        let log = FilePLog::new(dir.path());
        {
            let mut writer = log.writer(PID, SyncMode::Async).unwrap();
            for offset in 1..=first {
                writer.append(&event(offset)).unwrap();
            }
        }

        let mut writer = log.writer(PID, SyncMode::Async).unwrap();
        prop_assert_eq!(writer.last_offset(), Offset(first));
        prop_assert!(writer.append(&event(first)).is_err());
        for offset in first + 1..=first + second {
            writer.append(&event(offset)).unwrap();
        }
        drop(writer);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let seen = runtime.block_on(visited(&log, Offset::FIRST, ReadLimit::ToTheEnd));
        prop_assert_eq!(seen.len() as u64, first + second);
        prop_assert!(seen.windows(2).all(|w| w[0] + 1 == w[1]));
    }
}

#[tokio::test]
async fn test_count_limit_across_segments() {
    let dir = TempDir::new().unwrap();
    let log = FilePLog::new(dir.path());
    let mut writer =
        PLogWriter::open_with_max_size(partition_dir(log.root(), PID), SyncMode::Fsync, 160)
            .unwrap();
    for offset in 1..=30 {
        writer.append(&event(offset)).unwrap();
    }

    assert_eq!(
        visited(&log, Offset(12), ReadLimit::Count(4)).await,
        vec![12, 13, 14, 15]
    );
    assert!(visited(&log, Offset(31), ReadLimit::ToTheEnd).await.is_empty());
}
