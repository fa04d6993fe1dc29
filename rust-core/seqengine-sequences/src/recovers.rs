// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Partition recovery points.
//
// A recovery point records how far downstream consumers have incorporated
// the log: the last PLog offset of the partition and, per workspace, the
// last WLog offset and base record IDs. It is the counterpart of the
// sequencer checkpoint, which records the next values to hand out.
//
// Rows live in namespace `sys.prp` keyed by `"{pid:020}:{wsid:020}"`. The
// null-workspace row holds the partition's PLog offset only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use seqengine_plog::{Offset, PartitionId, RecordId, WorkspaceId};
use seqengine_storage::{StorageBackend, TypedStore};

use crate::error::{SequenceError, SequenceResult};
use crate::view::partition_prefix;

pub const RECOVERY_POINTS_NAMESPACE: &str = "sys.prp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct RecoveryRow {
    offset: Offset,
    #[serde(default)]
    base_record_id: RecordId,
    #[serde(default)]
    c_base_record_id: RecordId,
}

fn row_key(pid: PartitionId, ws: WorkspaceId) -> String {
    format!("{:020}:{:020}", pid.0, ws.0)
}

/// Recovery point of one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceRecoveryPoint {
    wsid: WorkspaceId,
    wlog_offset: Offset,
    base_record_id: RecordId,
    c_base_record_id: RecordId,
}

impl WorkspaceRecoveryPoint {
    pub fn wsid(&self) -> WorkspaceId {
        self.wsid
    }

    /// WLog offset of the last committed event.
    pub fn wlog_offset(&self) -> Offset {
        self.wlog_offset
    }

    pub fn base_record_id(&self) -> RecordId {
        self.base_record_id
    }

    /// Last compacting (CDoc/CRecord) base record ID.
    pub fn c_base_record_id(&self) -> RecordId {
        self.c_base_record_id
    }
}

/// Recovery point of one partition, with the set of workspaces changed since
/// it was last stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRecoveryPoint {
    pid: PartitionId,
    plog_offset: Offset,
    workspaces: BTreeMap<WorkspaceId, WorkspaceRecoveryPoint>,
    dirty: BTreeSet<WorkspaceId>,
}

impl PartitionRecoveryPoint {
    /// An empty point: nothing incorporated yet.
    pub fn new(pid: PartitionId) -> Self {
        Self {
            pid,
            plog_offset: Offset::NULL,
            workspaces: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn pid(&self) -> PartitionId {
        self.pid
    }

    /// PLog offset of the last committed event.
    pub fn plog_offset(&self) -> Offset {
        self.plog_offset
    }

    pub fn workspaces(&self) -> &BTreeMap<WorkspaceId, WorkspaceRecoveryPoint> {
        &self.workspaces
    }

    pub fn workspace(&self, ws: WorkspaceId) -> Option<&WorkspaceRecoveryPoint> {
        self.workspaces.get(&ws)
    }

    /// Workspaces changed since the last successful put.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Record a committed event. Values overwrite, they never accumulate,
    /// so replaying the same event twice is harmless. With the null
    /// workspace only the PLog offset moves.
    pub fn update(
        &mut self,
        plog: Offset,
        ws: WorkspaceId,
        wlog: Offset,
        id: RecordId,
        cid: RecordId,
    ) {
        self.plog_offset = plog;
        if ws.is_null() {
            return;
        }
        self.workspaces.insert(
            ws,
            WorkspaceRecoveryPoint {
                wsid: ws,
                wlog_offset: wlog,
                base_record_id: id,
                c_base_record_id: cid,
            },
        );
        self.dirty.insert(ws);
    }
}

/// Loads and stores partition recovery points.
#[derive(Clone)]
pub struct Recovers {
    store: TypedStore<Arc<dyn StorageBackend>>,
}

impl Recovers {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            store: TypedStore::new(storage, RECOVERY_POINTS_NAMESPACE),
        }
    }

    /// Load every row of `pid`. A partition without rows yields an empty
    /// point.
    pub async fn get(&self, pid: PartitionId) -> SequenceResult<PartitionRecoveryPoint> {
        let rows: Vec<(String, RecoveryRow)> =
            self.store.scan_prefix(&partition_prefix(pid)).await?;

        let mut point = PartitionRecoveryPoint::new(pid);
        for (key, row) in rows {
            let ws = key
                .split_once(':')
                .and_then(|(_, ws)| ws.parse::<u64>().ok())
                .map(WorkspaceId)
                .ok_or_else(|| SequenceError::Corrupted {
                    key: key.clone(),
                    reason: "expected partition:workspace".into(),
                })?;

            if ws.is_null() {
                point.plog_offset = row.offset;
            } else {
                point.workspaces.insert(
                    ws,
                    WorkspaceRecoveryPoint {
                        wsid: ws,
                        wlog_offset: row.offset,
                        base_record_id: row.base_record_id,
                        c_base_record_id: row.c_base_record_id,
                    },
                );
            }
        }
        debug!(
            partition = %pid,
            plog_offset = point.plog_offset.0,
            workspaces = point.workspaces.len(),
            "Loaded recovery point"
        );
        Ok(point)
    }

    /// Store the partition row and every dirty workspace row in one batch.
    /// The dirty set is cleared only when the batch lands.
    pub async fn put(&self, point: &mut PartitionRecoveryPoint) -> SequenceResult<()> {
        let mut rows: Vec<(String, RecoveryRow)> = point
            .dirty
            .iter()
            .filter_map(|ws| point.workspaces.get(ws))
            .map(|wp| {
                (
                    row_key(point.pid, wp.wsid),
                    RecoveryRow {
                        offset: wp.wlog_offset,
                        base_record_id: wp.base_record_id,
                        c_base_record_id: wp.c_base_record_id,
                    },
                )
            })
            .collect();
        rows.push((
            row_key(point.pid, WorkspaceId::NULL),
            RecoveryRow {
                offset: point.plog_offset,
                base_record_id: RecordId::NULL,
                c_base_record_id: RecordId::NULL,
            },
        ));

        self.store.put_batch(&rows).await?;
        debug!(partition = %point.pid, rows = rows.len(), "Stored recovery point");
        point.dirty.clear();
        Ok(())
    }
}
