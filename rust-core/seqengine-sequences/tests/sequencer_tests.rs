// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests of the sequencer: allocation, write-behind checkpoints,
//! crash recovery by log replay and behaviour under storage faults.

use std::sync::Arc;
use std::time::Duration;

use seqengine_plog::{
    Cud, DocCategory, InMemoryPLog, Offset, PLogEvent, PartitionId, RecordId, WorkspaceId,
};
use seqengine_sequences::{
    recovery, CheckpointView, Counters, Sequencer, SequencerConfig, SequencerStatus,
};
use seqengine_storage::{FaultyBackend, InMemoryBackend, MetricsBackend, StorageBackend};

const PID: PartitionId = PartitionId(1);
const WAIT: Duration = Duration::from_secs(5);

type TestBackend = MetricsBackend<FaultyBackend<InMemoryBackend>>;

struct Node {
    storage: Arc<TestBackend>,
    log: InMemoryPLog,
    config: SequencerConfig,
}

impl Node {
    fn new(flush_threshold: usize) -> Self {
        Self {
            storage: Arc::new(MetricsBackend::new(FaultyBackend::new(InMemoryBackend::new()))),
            log: InMemoryPLog::new(),
            config: SequencerConfig {
                flush_threshold,
                retry_base_delay_ms: 1,
                retry_max_delay_ms: 10,
            },
        }
    }

    fn faults(&self) -> &FaultyBackend<InMemoryBackend> {
        self.storage.inner()
    }

    fn sequencer(&self) -> Sequencer {
        let storage: Arc<dyn StorageBackend> = self.storage.clone();
        Sequencer::new(PID, storage, Arc::new(self.log.clone()), self.config.clone())
    }

    async fn recovered(&self) -> Sequencer {
        let seq = self.sequencer();
        seq.recovery();
        assert!(seq.wait_for_recovery(WAIT).await, "recovery did not finish");
        seq
    }

    fn view(&self) -> CheckpointView {
        let storage: Arc<dyn StorageBackend> = self.storage.clone();
        CheckpointView::new(storage, PID)
    }

    /// Run one event that allocates `records` ordinary and `compacting`
    /// compacting IDs, commit it to the log and finish it.
    async fn commit(&self, seq: &Sequencer, ws: u64, records: usize, compacting: usize) {
        let ws = WorkspaceId(ws);
        let (plog, wlog) = seq.start_event(WAIT, ws).await.expect("sequencer not ready");
        let mut event = PLogEvent::new(plog, ws, wlog);
        for _ in 0..records {
            event = event.with_cud(Cud::create(seq.next_rec_id(), DocCategory::WDoc));
        }
        for _ in 0..compacting {
            event = event.with_cud(Cud::create(seq.next_crec_id(), DocCategory::CRecord));
        }
        self.log.append(PID, event).unwrap();
        seq.finish_event();
    }

    /// Wait until at least `rows` checkpoint rows have been written.
    async fn wait_for_rows(&self, rows: u64) {
        for _ in 0..1000 {
            if self.storage.stats().await.rows_written >= rows {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected {rows} checkpoint rows to be written");
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_crash_before_first_flush_recovers_from_log() {
    let node = Node::new(100);
    let seq = node.recovered().await;
    let ws = WorkspaceId(10);

    let (plog, wlog) = seq.start_event(WAIT, ws).await.unwrap();
    assert_eq!((plog, wlog), (Offset(1), Offset(1)));
    let id = seq.next_rec_id();
    assert_eq!(id, RecordId(1));
    node.log
        .append(PID, PLogEvent::new(plog, ws, wlog).with_cud(Cud::create(id, DocCategory::WDoc)))
        .unwrap();
    seq.finish_event();

    let (plog, wlog) = seq.start_event(WAIT, ws).await.unwrap();
    assert_eq!((plog, wlog), (Offset(2), Offset(2)));
    let id = seq.next_rec_id();
    assert_eq!(id, RecordId(2));
    node.log
        .append(PID, PLogEvent::new(plog, ws, wlog).with_cud(Cud::create(id, DocCategory::WDoc)))
        .unwrap();
    seq.finish_event();

    // Crash: nothing was flushed.
    drop(seq);
    assert_eq!(node.storage.stats().await.batch_put_count, 0);

    let restarted = node.recovered().await;
    let counters = restarted.snapshot();
    assert_eq!(counters.plog_offset, Offset(2));
    assert_eq!(counters.wlog_offset(ws), Offset(2));
    assert_eq!(counters.rec_id(ws), RecordId(2));

    assert_eq!(
        restarted.start_event(WAIT, ws).await,
        Some((Offset(3), Offset(3)))
    );
    assert_eq!(restarted.next_rec_id(), RecordId(3));
    restarted.finish_event();
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_cancelled_event_rolls_back_to_log() {
    let node = Node::new(100);
    let seq = node.recovered().await;
    node.commit(&seq, 10, 1, 0).await;

    seq.start_event(WAIT, WorkspaceId(10)).await.unwrap();
    assert_eq!(seq.next_rec_id(), RecordId(2));
    assert_eq!(seq.next_rec_id(), RecordId(3));
    seq.cancel_event();
    assert_ne!(seq.status(), SequencerStatus::Eventing);

    assert!(seq.wait_for_recovery(WAIT).await);
    let counters = seq.snapshot();
    assert_eq!(counters.rec_id(WorkspaceId(10)), RecordId(1));
    assert_eq!(counters.plog_offset, Offset(1));

    assert_eq!(
        seq.start_event(WAIT, WorkspaceId(10)).await,
        Some((Offset(2), Offset(2)))
    );
    assert_eq!(seq.next_rec_id(), RecordId(2));
    seq.finish_event();
    seq.shutdown().await;
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lagging_checkpoint_recovers_exact_counters() {
    let node = Node::new(10);
    let seq = node.recovered().await;
    for i in 0..23u64 {
        node.commit(&seq, 10 + i % 3, (i % 4) as usize, (i % 2) as usize).await;
    }
    node.wait_for_rows(1).await;
    let expected = seq.snapshot();
    // Crash with the last events only in the log.
    drop(seq);

    let checkpoint = node.view().read_partition().await.unwrap();
    assert!(checkpoint.plog_offset >= Offset(10));
    assert!(checkpoint.plog_offset < Offset(23));

    let restarted = node.recovered().await;
    assert_eq!(restarted.snapshot(), expected);
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_recovery_twice_yields_same_counters() {
    let node = Node::new(4);
    let seq = node.recovered().await;
    for i in 0..9 {
        node.commit(&seq, 10 + i % 2, 2, 1).await;
    }
    drop(seq);

    let first = recovery::replay(&node.view(), &node.log).await.unwrap();
    let second = recovery::replay(&node.view(), &node.log).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.plog_offset, Offset(9));
}

#[tokio::test]
async fn test_cancel_without_allocation_keeps_counters() {
    let node = Node::new(100);
    let seq = node.recovered().await;
    node.commit(&seq, 10, 3, 2).await;
    let before = seq.snapshot();

    seq.start_event(WAIT, WorkspaceId(10)).await.unwrap();
    seq.cancel_event();
    assert!(seq.wait_for_recovery(WAIT).await);
    assert_eq!(seq.snapshot(), before);
    seq.shutdown().await;
}

#[tokio::test]
async fn test_recovery_retries_storage_and_log_failures() {
    let node = Node::new(100);
    let seq = node.recovered().await;
    for _ in 0..3 {
        node.commit(&seq, 7, 1, 1).await;
    }
    seq.shutdown().await;

    node.faults().fail_next_reads(2);
    node.log.fail_next_reads(2);

    let restarted = node.recovered().await;
    let counters = restarted.snapshot();
    assert_eq!(counters.plog_offset, Offset(3));
    assert_eq!(counters.rec_id(WorkspaceId(7)), RecordId(3));
    assert_eq!(counters.c_rec_id(WorkspaceId(7)), RecordId(3));
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_start_event_during_recovery_times_out() {
    let node = Node::new(100);
    node.faults().fail_forever();

    let seq = node.sequencer();
    seq.recovery();
    assert_eq!(seq.status(), SequencerStatus::Recover);
    assert_eq!(
        seq.start_event(Duration::from_millis(20), WorkspaceId(1)).await,
        None
    );
    assert!(!seq.wait_for_recovery(Duration::from_millis(20)).await);

    node.faults().heal();
    assert_eq!(
        seq.start_event(WAIT, WorkspaceId(1)).await,
        Some((Offset(1), Offset(1)))
    );
    seq.finish_event();
    seq.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_during_endless_outage() {
    let node = Node::new(100);
    node.faults().fail_forever();

    let seq = node.sequencer();
    seq.recovery();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(seq.status(), SequencerStatus::Recover);

    tokio::time::timeout(WAIT, seq.shutdown())
        .await
        .expect("shutdown hung on a dead backend");
    assert_eq!(seq.status(), SequencerStatus::Finished);
    assert_eq!(seq.start_event(WAIT, WorkspaceId(1)).await, None);
}

#[tokio::test]
async fn test_recovery_waits_for_flush_in_flight() {
    let node = Node::new(1);
    let seq = node.recovered().await;
    let ws = WorkspaceId(10);

    // Writes keep failing, reads still work.
    node.faults().fail_next_writes(1_000_000);
    node.commit(&seq, 10, 1, 0).await;

    seq.start_event(WAIT, ws).await.unwrap();
    assert_eq!(seq.next_rec_id(), RecordId(2));
    seq.cancel_event();

    for _ in 0..1000 {
        if node.storage.stats().await.failed_writes >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(node.storage.stats().await.failed_writes >= 2);
    assert!(!seq.wait_for_recovery(Duration::from_millis(30)).await);
    assert_eq!(seq.status(), SequencerStatus::Recover);
    assert_eq!(node.storage.stats().await.rows_written, 0);

    node.faults().heal();
    assert!(seq.wait_for_recovery(WAIT).await);
    assert_eq!(node.storage.stats().await.rows_written, 3);

    let counters = seq.snapshot();
    assert_eq!(counters, recovery::replay(&node.view(), &node.log).await.unwrap());
    assert_eq!(counters.plog_offset, Offset(1));
    assert_eq!(counters.rec_id(ws), RecordId(1));
    seq.shutdown().await;
}

#[tokio::test]
async fn test_corrupted_checkpoint_row_blocks_recovery() {
    let node = Node::new(100);
    node.storage
        .put(
            b"sys.sequences:00000000000000000001:abc:sys.RecIDSeq",
            br#"{"last":1}"#,
        )
        .await
        .unwrap();

    let seq = node.sequencer();
    seq.recovery();
    assert!(!seq.wait_for_recovery(Duration::from_millis(30)).await);
    assert_eq!(seq.status(), SequencerStatus::Recover);

    tokio::time::timeout(WAIT, seq.shutdown())
        .await
        .expect("shutdown hung on a corrupted checkpoint");
    assert_eq!(seq.status(), SequencerStatus::Finished);
}

// ---------------------------------------------------------------------------
// Checkpoint flushing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_flush_threshold_batches_writes() {
    let node = Node::new(100);
    let seq = node.recovered().await;

    for i in 0..99 {
        node.commit(&seq, 10 + i % 2, 1, 0).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(node.storage.stats().await.batch_put_count, 0);

    node.commit(&seq, 10, 1, 0).await;
    node.wait_for_rows(5).await;

    let stats = node.storage.stats().await;
    assert_eq!(stats.batch_put_count, 1);
    // Two workspaces with wlog and rec rows each, plus the partition row.
    assert_eq!(stats.rows_written, 5);

    let checkpoint = node.view().read_partition().await.unwrap();
    assert_eq!(checkpoint.plog_offset, Offset(100));
    assert_eq!(checkpoint.wlog_offset(WorkspaceId(10)), Offset(51));
    assert_eq!(checkpoint.rec_id(WorkspaceId(11)), RecordId(49));
    seq.shutdown().await;
}

#[tokio::test]
async fn test_flush_retries_until_storage_recovers() {
    let node = Node::new(1);
    let seq = node.recovered().await;

    node.faults().fail_next_writes(3);
    node.commit(&seq, 10, 2, 0).await;
    node.wait_for_rows(3).await;

    let stats = node.storage.stats().await;
    assert_eq!(stats.failed_writes, 3);
    assert_eq!(stats.batch_put_count, 4);
    assert_eq!(stats.rows_written, 3);

    let checkpoint = node.view().read_partition().await.unwrap();
    assert_eq!(checkpoint.rec_id(WorkspaceId(10)), RecordId(2));
    seq.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_pending_changes() {
    let node = Node::new(100);
    let seq = node.recovered().await;
    for _ in 0..5 {
        node.commit(&seq, 3, 1, 0).await;
    }
    assert_eq!(node.storage.stats().await.batch_put_count, 0);

    seq.shutdown().await;
    assert_eq!(node.storage.stats().await.batch_put_count, 1);

    let expected = Counters {
        plog_offset: Offset(5),
        wlog_offset: [(WorkspaceId(3), Offset(5))].into_iter().collect(),
        rec_id: [(WorkspaceId(3), RecordId(5))].into_iter().collect(),
        c_rec_id: Default::default(),
    };
    assert_eq!(node.view().read_partition().await.unwrap(), expected);
}
