// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory sequence counters of one partition.

use std::collections::BTreeMap;

use seqengine_plog::{IdSequence, Offset, PLogEvent, RecordId, WorkspaceId};

/// Last value handed out for every sequence of a partition.
///
/// A missing workspace entry means nothing was allocated there yet, so all
/// accessors default to the null value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub plog_offset: Offset,
    pub wlog_offset: BTreeMap<WorkspaceId, Offset>,
    pub rec_id: BTreeMap<WorkspaceId, RecordId>,
    pub c_rec_id: BTreeMap<WorkspaceId, RecordId>,
}

impl Counters {
    pub fn wlog_offset(&self, ws: WorkspaceId) -> Offset {
        self.wlog_offset.get(&ws).copied().unwrap_or_default()
    }

    pub fn rec_id(&self, ws: WorkspaceId) -> RecordId {
        self.rec_id.get(&ws).copied().unwrap_or_default()
    }

    pub fn c_rec_id(&self, ws: WorkspaceId) -> RecordId {
        self.c_rec_id.get(&ws).copied().unwrap_or_default()
    }

    /// Raise the counters so they cover everything `event` consumed.
    ///
    /// Only ever moves values up, so observing an event that a checkpoint
    /// already reflects changes nothing.
    pub fn observe(&mut self, event: &PLogEvent) {
        self.plog_offset = self.plog_offset.max(event.offset);

        let wlog = self.wlog_offset.entry(event.workspace).or_default();
        *wlog = (*wlog).max(event.wlog_offset);

        for (sequence, id) in event.used_ids() {
            let counter = match sequence {
                IdSequence::RecId => self.rec_id.entry(event.workspace).or_default(),
                IdSequence::CRecId => self.c_rec_id.entry(event.workspace).or_default(),
            };
            *counter = (*counter).max(id);
        }
    }
}
