// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Write-behind persistence of sequence checkpoints.
//
// Finished events are merged into a pending batch, last value wins per
// workspace. The batch is handed to a single worker task through a channel
// of capacity one once it holds `flush_threshold` events, or on an explicit
// flush. The `active` flag is raised at handoff and cleared by the worker
// after the batch is durable, so at most one flush is ever in flight and,
// while `active` is false, the channel is empty.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use seqengine_plog::{Offset, PartitionId, RecordId, WorkspaceId};

use crate::config::SequencerConfig;
use crate::view::{CheckpointRow, CheckpointView, SequenceKind};

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// Latest collected values per workspace, plus the number of events merged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Changes {
    plog_offset: Offset,
    wlog_offset: BTreeMap<WorkspaceId, Offset>,
    rec_id: BTreeMap<WorkspaceId, RecordId>,
    c_rec_id: BTreeMap<WorkspaceId, RecordId>,
    count: usize,
}

impl Changes {
    fn merge(
        &mut self,
        plog_offset: Offset,
        ws: WorkspaceId,
        wlog_offset: Offset,
        rec_id: RecordId,
        c_rec_id: RecordId,
    ) {
        self.plog_offset = plog_offset;
        self.wlog_offset.insert(ws, wlog_offset);
        self.rec_id.insert(ws, rec_id);
        self.c_rec_id.insert(ws, c_rec_id);
        self.count += 1;
    }

    /// One row per workspace and sequence, then the partition row. ID rows
    /// are omitted while the workspace has not allocated from them.
    pub(crate) fn rows(&self) -> Vec<CheckpointRow> {
        let mut rows = Vec::with_capacity(self.wlog_offset.len() * 3 + 1);
        for (&workspace, wlog) in &self.wlog_offset {
            rows.push(CheckpointRow {
                workspace,
                kind: SequenceKind::WLogOffset,
                last: wlog.0,
            });
            if let Some(id) = self.rec_id.get(&workspace).filter(|id| id.0 != 0) {
                rows.push(CheckpointRow {
                    workspace,
                    kind: SequenceKind::RecId,
                    last: id.0,
                });
            }
            if let Some(id) = self.c_rec_id.get(&workspace).filter(|id| id.0 != 0) {
                rows.push(CheckpointRow {
                    workspace,
                    kind: SequenceKind::CRecId,
                    last: id.0,
                });
            }
        }
        rows.push(CheckpointRow {
            workspace: WorkspaceId::NULL,
            kind: SequenceKind::PLogOffset,
            last: self.plog_offset.0,
        });
        rows
    }
}

// ---------------------------------------------------------------------------
// Flusher
// ---------------------------------------------------------------------------

enum Handoff {
    Nothing,
    Busy,
    Sent,
}

pub(crate) struct Flusher {
    pid: PartitionId,
    threshold: usize,
    pending: Mutex<Changes>,
    active: Arc<watch::Sender<bool>>,
    handoff: Mutex<Option<mpsc::Sender<Changes>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Flusher {
    /// Spawn the worker on `runtime`. The worker gives up retrying a failed
    /// write once `shutdown` turns true.
    pub(crate) fn spawn(
        runtime: &tokio::runtime::Handle,
        view: CheckpointView,
        config: &SequencerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let pid = view.pid();
        let (tx, rx) = mpsc::channel(1);
        let (active, _) = watch::channel(false);
        let active = Arc::new(active);

        let worker = runtime.spawn(run_worker(
            view,
            rx,
            Arc::clone(&active),
            shutdown,
            config.clone(),
        ));

        Self {
            pid,
            threshold: config.flush_threshold,
            pending: Mutex::new(Changes::default()),
            active,
            handoff: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Changes> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the state after a finished event. Never blocks on storage.
    pub(crate) fn collect(
        &self,
        plog_offset: Offset,
        ws: WorkspaceId,
        wlog_offset: Offset,
        rec_id: RecordId,
        c_rec_id: RecordId,
    ) {
        let mut pending = self.lock_pending();
        pending.merge(plog_offset, ws, wlog_offset, rec_id, c_rec_id);
        if pending.count >= self.threshold && !self.is_active() {
            self.hand_off(&mut pending);
        }
    }

    /// Hand the pending batch to the worker, first waiting out any flush
    /// already in flight.
    pub(crate) async fn flush(&self) {
        loop {
            self.wait_for_inactive().await;
            match self.try_hand_off() {
                Handoff::Busy => continue,
                Handoff::Nothing | Handoff::Sent => return,
            }
        }
    }

    fn try_hand_off(&self) -> Handoff {
        let mut pending = self.lock_pending();
        if pending.count == 0 {
            return Handoff::Nothing;
        }
        if self.is_active() {
            return Handoff::Busy;
        }
        self.hand_off(&mut pending);
        Handoff::Sent
    }

    /// Must be called with the pending lock held and no flush in flight.
    fn hand_off(&self, pending: &mut Changes) {
        let handoff = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = handoff.as_ref() else {
            warn!(
                partition = %self.pid,
                events = pending.count,
                "Flusher closed, dropping pending checkpoint batch"
            );
            *pending = Changes::default();
            return;
        };

        let changes = std::mem::take(pending);
        let events = changes.count;
        self.active.send_replace(true);
        match tx.try_send(changes) {
            Ok(()) => debug!(partition = %self.pid, events, "Handed checkpoint batch to flusher"),
            Err(mpsc::error::TrySendError::Full(changes)) => {
                // The worker still owns the slot and will clear `active`.
                *pending = changes;
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.active.send_replace(false);
                warn!(partition = %self.pid, events, "Flusher worker gone, dropping batch");
            }
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Resolve once no flush is in flight.
    pub(crate) async fn wait_for_inactive(&self) {
        let mut active = self.active.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = active.wait_for(|active| !*active).await;
    }

    /// Stop accepting batches and wait for the worker to drain and exit.
    pub(crate) async fn close(&self) {
        let tx = self
            .handoff
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(tx);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(partition = %self.pid, error = %e, "Flusher worker ended abnormally");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Changes {
        self.lock_pending().clone()
    }
}

/// Persist each handed-off batch, retrying with bounded backoff until it
/// lands or shutdown is requested.
async fn run_worker(
    view: CheckpointView,
    mut rx: mpsc::Receiver<Changes>,
    active: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
    config: SequencerConfig,
) {
    let pid = view.pid();
    while let Some(changes) = rx.recv().await {
        let rows = changes.rows();
        let mut attempt = 0u32;
        loop {
            match view.put_batch(&rows).await {
                Ok(()) => {
                    debug!(partition = %pid, rows = rows.len(), "Checkpoint batch written");
                    break;
                }
                Err(e) => {
                    attempt += 1;
                    if *shutdown.borrow() {
                        warn!(partition = %pid, attempt, error = %e, "Abandoning checkpoint batch on shutdown");
                        break;
                    }
                    warn!(partition = %pid, attempt, error = %e, "Checkpoint write failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(config.retry_delay(attempt)) => {}
                        _ = shutdown.wait_for(|stop| *stop) => {}
                    }
                }
            }
        }
        active.send_replace(false);
    }
    debug!(partition = %pid, "Flusher worker stopped");
}
