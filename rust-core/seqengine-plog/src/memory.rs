// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory partition logs for tests and embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{PLogError, PLogResult};
use crate::event::PLogEvent;
use crate::ids::{Offset, PartitionId};
use crate::log::{PLogReader, ReadLimit, Visitor};

type Partitions = HashMap<PartitionId, Vec<PLogEvent>>;

/// Shared in-memory logs. Clones see the same events and the same injected
/// read failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPLog {
    partitions: Arc<Mutex<Partitions>>,
    read_failures: Arc<AtomicUsize>,
}

impl InMemoryPLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Partitions> {
        // Every mutation is a single push, so a poisoned map is still consistent.
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Commit an event to its partition. The offset must move past the last
    /// committed one.
    pub fn append(&self, pid: PartitionId, event: PLogEvent) -> PLogResult<Offset> {
        let mut partitions = self.lock();
        let events = partitions.entry(pid).or_default();
        let last = events.last().map(|e| e.offset).unwrap_or(Offset::NULL);
        if event.offset <= last {
            return Err(PLogError::OffsetRegression {
                offset: event.offset,
                last,
            });
        }
        let offset = event.offset;
        events.push(event);
        Ok(offset)
    }

    /// Number of events committed to `pid`.
    pub fn len(&self, pid: PartitionId) -> usize {
        self.lock().get(&pid).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, pid: PartitionId) -> bool {
        self.len(pid) == 0
    }

    /// Make the next `count` reads fail with [`PLogError::Unavailable`].
    pub fn fail_next_reads(&self, count: usize) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PLogReader for InMemoryPLog {
    async fn read_plog(
        &self,
        pid: PartitionId,
        from: Offset,
        limit: ReadLimit,
        visitor: &mut Visitor<'_>,
    ) -> PLogResult<()> {
        if self.take_failure() {
            return Err(PLogError::Unavailable {
                partition: pid,
                reason: "injected read failure".to_string(),
            });
        }

        // Copy out so the lock is not held while the visitor runs.
        let events: Vec<PLogEvent> = self
            .lock()
            .get(&pid)
            .map(|events| {
                let mut selected: Vec<PLogEvent> = Vec::new();
                for event in events.iter().filter(|e| e.offset >= from) {
                    if limit.reached(selected.len()) {
                        break;
                    }
                    selected.push(event.clone());
                }
                selected
            })
            .unwrap_or_default();

        for event in &events {
            visitor(event)?;
        }
        Ok(())
    }
}
