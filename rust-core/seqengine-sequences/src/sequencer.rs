// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The per-partition sequencer.
//
// A sequencer hands out PLog offsets, WLog offsets and record IDs while the
// command pipeline builds an event. Its status moves through
//
//   None -> Recover -> Ready <-> Eventing
//                        ^          |
//                        +- Recover <+   (cancel_event)
//   Ready | Recover -> Finished          (shutdown)
//
// Every transition happens with the state lock held. Allocation methods
// called in the wrong status are caller bugs and panic.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use seqengine_plog::{Offset, PLogReader, PartitionId, RecordId, WorkspaceId};
use seqengine_storage::StorageBackend;

use crate::config::SequencerConfig;
use crate::counters::Counters;
use crate::flusher::Flusher;
use crate::recovery;
use crate::view::CheckpointView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerStatus {
    /// Constructed, counters not loaded yet.
    None,
    /// Counters are being rebuilt; allocation has to wait.
    Recover,
    /// Safe to start an event.
    Ready,
    /// Inside an event: offsets reserved, not finished or cancelled yet.
    Eventing,
    /// Shut down for good.
    Finished,
}

impl fmt::Display for SequencerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub(crate) struct State {
    pub(crate) counters: Counters,
    /// Workspace of the event in progress.
    ws: WorkspaceId,
}

/// State reachable from both the caller and the recovery task.
pub(crate) struct Shared {
    pub(crate) config: SequencerConfig,
    pub(crate) view: CheckpointView,
    pub(crate) log: Arc<dyn PLogReader>,
    pub(crate) flusher: Flusher,
    pub(crate) status: watch::Sender<SequencerStatus>,
    pub(crate) shutdown: watch::Sender<bool>,
    state: Mutex<State>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> SequencerStatus {
        *self.status.borrow()
    }
}

/// Offset and ID allocator of one partition.
pub struct Sequencer {
    pid: PartitionId,
    runtime: Handle,
    shared: Arc<Shared>,
    recovery_task: Mutex<Option<JoinHandle<()>>>,
}

impl Sequencer {
    /// Create the sequencer of `pid` in status `None` and spawn its flusher
    /// worker. Must be called from within a tokio runtime.
    pub fn new(
        pid: PartitionId,
        checkpoints: Arc<dyn StorageBackend>,
        log: Arc<dyn PLogReader>,
        config: SequencerConfig,
    ) -> Self {
        let runtime = Handle::current();
        let view = CheckpointView::new(checkpoints, pid);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let flusher = Flusher::spawn(&runtime, view.clone(), &config, shutdown_rx);
        let (status, _) = watch::channel(SequencerStatus::None);

        Self {
            pid,
            runtime,
            shared: Arc::new(Shared {
                config,
                view,
                log,
                flusher,
                status,
                shutdown,
                state: Mutex::new(State {
                    counters: Counters::default(),
                    ws: WorkspaceId::NULL,
                }),
            }),
            recovery_task: Mutex::new(None),
        }
    }

    pub fn pid(&self) -> PartitionId {
        self.pid
    }

    pub fn status(&self) -> SequencerStatus {
        self.shared.status()
    }

    /// Copy of the in-memory counters.
    pub fn snapshot(&self) -> Counters {
        self.shared.lock_state().counters.clone()
    }

    fn expect_status(&self, expected: SequencerStatus, operation: &str) {
        let status = self.status();
        if status != expected {
            panic!(
                "sequencer of partition {}: {operation} called in status {status}, expected {expected}",
                self.pid
            );
        }
    }

    /// Start rebuilding counters in the background.
    ///
    /// # Panics
    ///
    /// Unless the status is `None`.
    pub fn recovery(&self) {
        let _state = self.shared.lock_state();
        self.expect_status(SequencerStatus::None, "recovery");
        self.start_recovery();
    }

    /// Caller holds the state lock.
    fn start_recovery(&self) {
        self.shared.status.send_replace(SequencerStatus::Recover);
        let task = self
            .runtime
            .spawn(recovery::run(Arc::clone(&self.shared)));
        let previous = self
            .recovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        // A previous task has already set Ready, so it is finished or about
        // to return.
        drop(previous);
    }

    /// Reserve the next PLog offset and the next WLog offset of `ws`.
    ///
    /// While recovery runs, waits up to `wait` for it. Returns `None` when
    /// recovery does not finish in time or the sequencer is shutting down;
    /// the caller should retry the whole event later.
    ///
    /// # Panics
    ///
    /// If an event is already in progress, or recovery was never started.
    pub async fn start_event(&self, wait: Duration, ws: WorkspaceId) -> Option<(Offset, Offset)> {
        if *self.shared.shutdown.borrow() {
            return None;
        }
        if self.status() == SequencerStatus::Recover && !self.wait_ready(wait).await {
            debug!(partition = %self.pid, workspace = %ws, "start_event timed out waiting for recovery");
            return None;
        }

        let mut guard = self.shared.lock_state();
        match self.status() {
            SequencerStatus::Ready => {}
            SequencerStatus::Recover | SequencerStatus::Finished => return None,
            status => panic!(
                "sequencer of partition {}: start_event called in status {status}",
                self.pid
            ),
        }

        let state = &mut *guard;
        state.ws = ws;
        state.counters.plog_offset = state.counters.plog_offset.next();
        let wlog = state.counters.wlog_offset.entry(ws).or_default();
        *wlog = wlog.next();
        let offsets = (state.counters.plog_offset, *wlog);
        self.shared.status.send_replace(SequencerStatus::Eventing);
        Some(offsets)
    }

    async fn wait_ready(&self, wait: Duration) -> bool {
        let mut status = self.shared.status.subscribe();
        let mut shutdown = self.shared.shutdown.subscribe();
        let ready = tokio::select! {
            ready = tokio::time::timeout(wait, status.wait_for(|s| *s == SequencerStatus::Ready)) => {
                matches!(ready, Ok(Ok(_)))
            }
            _ = shutdown.wait_for(|stop| *stop) => false,
        };
        ready
    }

    /// Next ordinary record ID of the event's workspace.
    ///
    /// # Panics
    ///
    /// Outside an event.
    pub fn next_rec_id(&self) -> RecordId {
        let mut state = self.shared.lock_state();
        self.expect_status(SequencerStatus::Eventing, "next_rec_id");
        let ws = state.ws;
        let id = state.counters.rec_id.entry(ws).or_default();
        *id = id.next();
        *id
    }

    /// Next compacting record ID of the event's workspace.
    ///
    /// # Panics
    ///
    /// Outside an event.
    pub fn next_crec_id(&self) -> RecordId {
        let mut state = self.shared.lock_state();
        self.expect_status(SequencerStatus::Eventing, "next_crec_id");
        let ws = state.ws;
        let id = state.counters.c_rec_id.entry(ws).or_default();
        *id = id.next();
        *id
    }

    /// Close the event and queue its counters for checkpointing.
    ///
    /// # Panics
    ///
    /// Outside an event.
    pub fn finish_event(&self) {
        let state = self.shared.lock_state();
        self.expect_status(SequencerStatus::Eventing, "finish_event");
        let ws = state.ws;
        self.shared.flusher.collect(
            state.counters.plog_offset,
            ws,
            state.counters.wlog_offset(ws),
            state.counters.rec_id(ws),
            state.counters.c_rec_id(ws),
        );
        self.shared.status.send_replace(SequencerStatus::Ready);
    }

    /// Abandon the event. Values handed out inside it may already be in
    /// use elsewhere, so counters are rebuilt from the log instead of being
    /// rolled back.
    ///
    /// # Panics
    ///
    /// Outside an event.
    pub fn cancel_event(&self) {
        let _state = self.shared.lock_state();
        self.expect_status(SequencerStatus::Eventing, "cancel_event");
        warn!(partition = %self.pid, "Event cancelled, recovering sequencer");
        self.start_recovery();
    }

    /// Wait until the sequencer is `Ready`. Returns `false` on timeout.
    pub async fn wait_for_recovery(&self, timeout: Duration) -> bool {
        if self.status() == SequencerStatus::Ready {
            return true;
        }
        let mut status = self.shared.status.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, status.wait_for(|s| *s == SequencerStatus::Ready)).await,
            Ok(Ok(_))
        );
        ready
    }

    /// Stop the sequencer: abandon any running recovery, write the last
    /// checkpoint batch and stop the flusher. Idempotent.
    ///
    /// # Panics
    ///
    /// If an event is in progress.
    pub async fn shutdown(&self) {
        {
            let _state = self.shared.lock_state();
            if self.status() == SequencerStatus::Eventing {
                panic!(
                    "sequencer of partition {}: shutdown called in status Eventing",
                    self.pid
                );
            }
            self.shared.shutdown.send_replace(true);
        }

        let task = self
            .recovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(partition = %self.pid, error = %e, "Recovery task ended abnormally");
            }
        }

        self.shared.flusher.flush().await;
        self.shared.flusher.wait_for_inactive().await;
        self.shared.flusher.close().await;

        let _state = self.shared.lock_state();
        self.shared.status.send_replace(SequencerStatus::Finished);
        info!(partition = %self.pid, "Sequencer finished");
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("pid", &self.pid)
            .field("status", &self.status())
            .finish()
    }
}
