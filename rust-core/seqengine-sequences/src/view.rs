// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The durable checkpoint view.
//
// One row per (partition, workspace, sequence) holding the last flushed
// value. The partition-scoped PLog offset lives under the null workspace.
// Keys are zero-padded so that a prefix scan over `"{pid:020}:"` returns
// exactly one partition.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use seqengine_plog::{Offset, PartitionId, RecordId, WorkspaceId};
use seqengine_storage::{StorageBackend, TypedStore};

use crate::counters::Counters;
use crate::error::{SequenceError, SequenceResult};

pub const SEQUENCES_NAMESPACE: &str = "sys.sequences";

/// The four sequences the engine allocates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SequenceKind {
    PLogOffset,
    WLogOffset,
    RecId,
    CRecId,
}

impl SequenceKind {
    pub const ALL: [SequenceKind; 4] = [
        SequenceKind::PLogOffset,
        SequenceKind::WLogOffset,
        SequenceKind::RecId,
        SequenceKind::CRecId,
    ];

    /// Qualified name stored in the row key.
    pub fn name(self) -> &'static str {
        match self {
            Self::PLogOffset => "sys.PLogOffsetSeq",
            Self::WLogOffset => "sys.WLogOffsetSeq",
            Self::RecId => "sys.RecIDSeq",
            Self::CRecId => "sys.CRecIDSeq",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Stored value of a checkpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRow {
    pub last: u64,
}

/// One checkpoint row to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointRow {
    pub workspace: WorkspaceId,
    pub kind: SequenceKind,
    pub last: u64,
}

pub fn partition_prefix(pid: PartitionId) -> String {
    format!("{:020}:", pid.0)
}

pub fn sequence_key(pid: PartitionId, ws: WorkspaceId, kind: SequenceKind) -> String {
    format!("{:020}:{:020}:{}", pid.0, ws.0, kind.name())
}

/// Checkpoint rows of one partition.
#[derive(Clone)]
pub struct CheckpointView {
    store: TypedStore<Arc<dyn StorageBackend>>,
    pid: PartitionId,
}

impl CheckpointView {
    pub fn new(storage: Arc<dyn StorageBackend>, pid: PartitionId) -> Self {
        Self {
            store: TypedStore::new(storage, SEQUENCES_NAMESPACE),
            pid,
        }
    }

    pub fn pid(&self) -> PartitionId {
        self.pid
    }

    /// Load every checkpoint row of the partition into fresh counters.
    pub async fn read_partition(&self) -> SequenceResult<Counters> {
        let rows: Vec<(String, SequenceRow)> =
            self.store.scan_prefix(&partition_prefix(self.pid)).await?;

        let mut counters = Counters::default();
        for (key, row) in rows {
            let mut parts = key.splitn(3, ':');
            let (_pid, ws, name) = match (parts.next(), parts.next(), parts.next()) {
                (Some(pid), Some(ws), Some(name)) => (pid, ws, name),
                _ => {
                    return Err(SequenceError::Corrupted {
                        key: key.clone(),
                        reason: "expected partition:workspace:sequence".into(),
                    })
                }
            };
            let ws = match ws.parse::<u64>() {
                Ok(ws) => WorkspaceId(ws),
                Err(e) => {
                    return Err(SequenceError::Corrupted {
                        key: key.clone(),
                        reason: format!("workspace id: {e}"),
                    })
                }
            };

            match SequenceKind::from_name(name) {
                Some(SequenceKind::PLogOffset) => counters.plog_offset = Offset(row.last),
                Some(SequenceKind::WLogOffset) => {
                    counters.wlog_offset.insert(ws, Offset(row.last));
                }
                Some(SequenceKind::RecId) => {
                    counters.rec_id.insert(ws, RecordId(row.last));
                }
                Some(SequenceKind::CRecId) => {
                    counters.c_rec_id.insert(ws, RecordId(row.last));
                }
                None => {
                    warn!(partition = %self.pid, key = %key, "Ignoring unknown sequence row");
                }
            }
        }
        Ok(counters)
    }

    /// Write `rows` as a single atomic batch.
    pub async fn put_batch(&self, rows: &[CheckpointRow]) -> SequenceResult<()> {
        let entries: Vec<(String, SequenceRow)> = rows
            .iter()
            .map(|row| {
                (
                    sequence_key(self.pid, row.workspace, row.kind),
                    SequenceRow { last: row.last },
                )
            })
            .collect();
        self.store.put_batch(&entries).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqengine_storage::InMemoryBackend;

    fn row(ws: u64, kind: SequenceKind, last: u64) -> CheckpointRow {
        CheckpointRow {
            workspace: WorkspaceId(ws),
            kind,
            last,
        }
    }

    #[test]
    fn test_names_roundtrip() {
        for kind in SequenceKind::ALL {
            assert_eq!(SequenceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SequenceKind::from_name("sys.Unknown"), None);
        assert_eq!(
            sequence_key(PartitionId(1), WorkspaceId(10), SequenceKind::RecId),
            "00000000000000000001:00000000000000000010:sys.RecIDSeq"
        );
    }

    #[tokio::test]
    async fn test_rows_load_into_counters() {
        let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let view = CheckpointView::new(storage.clone(), PartitionId(1));
        let other = CheckpointView::new(storage, PartitionId(11));

        view.put_batch(&[
            row(0, SequenceKind::PLogOffset, 7),
            row(10, SequenceKind::WLogOffset, 5),
            row(10, SequenceKind::RecId, 12),
            row(20, SequenceKind::CRecId, 3),
        ])
        .await
        .unwrap();
        other
            .put_batch(&[row(0, SequenceKind::PLogOffset, 99)])
            .await
            .unwrap();

        let counters = view.read_partition().await.unwrap();
        assert_eq!(counters.plog_offset, Offset(7));
        assert_eq!(counters.wlog_offset(WorkspaceId(10)), Offset(5));
        assert_eq!(counters.rec_id(WorkspaceId(10)), RecordId(12));
        assert_eq!(counters.c_rec_id(WorkspaceId(20)), RecordId(3));
        assert_eq!(counters.c_rec_id(WorkspaceId(10)), RecordId::NULL);
    }

    #[tokio::test]
    async fn test_unknown_sequence_ignored() {
        let backend = InMemoryBackend::new();
        let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
        let store = TypedStore::new(backend, SEQUENCES_NAMESPACE);
        store
            .put(
                "00000000000000000001:00000000000000000010:sys.FutureSeq",
                &SequenceRow { last: 1 },
            )
            .await
            .unwrap();

        let counters = CheckpointView::new(storage, PartitionId(1))
            .read_partition()
            .await
            .unwrap();
        assert_eq!(counters, Counters::default());
    }

    #[tokio::test]
    async fn test_corrupted_workspace_key() {
        let backend = InMemoryBackend::new();
        let storage: Arc<dyn StorageBackend> = Arc::new(backend.clone());
        TypedStore::new(backend, SEQUENCES_NAMESPACE)
            .put("00000000000000000001:abc:sys.RecIDSeq", &SequenceRow { last: 1 })
            .await
            .unwrap();

        let result = CheckpointView::new(storage, PartitionId(1))
            .read_partition()
            .await;
        assert!(matches!(result, Err(SequenceError::Corrupted { .. })));
    }
}
