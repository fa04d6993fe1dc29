// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rebuilding sequencer counters after a restart or a cancelled event.
//
// Checkpoints lag the truth, the partition log does not. Recovery loads the
// checkpoint rows and then replays the log from the checkpointed PLog
// offset (inclusive) to the end, raising every counter to the highest value
// a committed event actually used.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use seqengine_plog::{PLogReader, ReadLimit};

use crate::counters::Counters;
use crate::error::SequenceResult;
use crate::sequencer::{SequencerStatus, Shared};
use crate::view::CheckpointView;

/// Checkpoint plus log tail, as one attempt.
pub async fn replay(view: &CheckpointView, log: &dyn PLogReader) -> SequenceResult<Counters> {
    let mut counters = view.read_partition().await?;
    let from = counters.plog_offset;

    let mut replayed = 0usize;
    log.read_plog(view.pid(), from, ReadLimit::ToTheEnd, &mut |event| {
        counters.observe(event);
        replayed += 1;
        Ok(())
    })
    .await?;

    debug!(
        partition = %view.pid(),
        from = from.0,
        replayed,
        plog_offset = counters.plog_offset.0,
        "Replayed PLog tail"
    );
    Ok(counters)
}

/// Body of the background recovery task. Retries until it succeeds or the
/// sequencer shuts down.
pub(crate) async fn run(shared: Arc<Shared>) {
    let pid = shared.view.pid();
    let mut shutdown = shared.shutdown.subscribe();
    let mut attempt = 0u32;
    info!(partition = %pid, "Sequencer recovery started");

    loop {
        if *shutdown.borrow() {
            info!(partition = %pid, attempt, "Sequencer recovery abandoned on shutdown");
            return;
        }

        tokio::select! {
            _ = shared.flusher.wait_for_inactive() => {}
            _ = shutdown.wait_for(|stop| *stop) => continue,
        }
        shared.lock_state().counters = Counters::default();

        match replay(&shared.view, shared.log.as_ref()).await {
            Ok(counters) => {
                let mut state = shared.lock_state();
                info!(
                    partition = %pid,
                    plog_offset = counters.plog_offset.0,
                    workspaces = counters.wlog_offset.len(),
                    "Sequencer recovered"
                );
                state.counters = counters;
                shared.status.send_replace(SequencerStatus::Ready);
                return;
            }
            Err(e) if !e.is_transient() => {
                attempt += 1;
                // Stays blocked until the stored rows are repaired.
                error!(partition = %pid, attempt, error = %e, "Checkpoint unreadable, sequencer recovery blocked");
                wait_retry(&shared, attempt, &mut shutdown).await;
            }
            Err(e) => {
                attempt += 1;
                warn!(partition = %pid, attempt, error = %e, "Sequencer recovery failed, retrying");
                wait_retry(&shared, attempt, &mut shutdown).await;
            }
        }
    }
}

async fn wait_retry(shared: &Shared, attempt: u32, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(shared.config.retry_delay(attempt)) => {}
        _ = shutdown.wait_for(|stop| *stop) => {}
    }
}
