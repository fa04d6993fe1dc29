// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The committed-event model.
//
// A `PLogEvent` is one entry of the partition log: the workspace it belongs
// to, the offsets the sequencer assigned to it, and the record IDs it used.
// Recovery only needs the IDs, so nothing else about a mutation is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Offset, RecordId, WorkspaceId};

/// The per-workspace counter that owns the IDs of a document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdSequence {
    /// Ordinary record IDs.
    RecId,
    /// Compacting record IDs.
    CRecId,
}

/// Category of the document a mutation or argument object targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocCategory {
    CDoc,
    CRecord,
    ODoc,
    ORecord,
    WDoc,
    WRecord,
    /// Plain argument object.
    Object,
    /// View rows are keyed by value and never take a record ID.
    View,
}

impl DocCategory {
    /// Which counter allocated the ID of a record of this category.
    pub fn id_sequence(self) -> Option<IdSequence> {
        match self {
            Self::CDoc | Self::CRecord => Some(IdSequence::CRecId),
            Self::ODoc | Self::ORecord | Self::WDoc | Self::WRecord | Self::Object => {
                Some(IdSequence::RecId)
            }
            Self::View => None,
        }
    }
}

/// One create/update mutation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cud {
    pub id: RecordId,
    pub category: DocCategory,
    /// `true` for a newly inserted record, `false` for an update.
    pub is_new: bool,
}

impl Cud {
    pub fn create(id: RecordId, category: DocCategory) -> Self {
        Self {
            id,
            category,
            is_new: true,
        }
    }

    pub fn update(id: RecordId, category: DocCategory) -> Self {
        Self {
            id,
            category,
            is_new: false,
        }
    }
}

/// An argument object created while the event was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgObject {
    pub id: RecordId,
    pub category: DocCategory,
}

/// A committed entry of the partition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PLogEvent {
    pub offset: Offset,
    pub timestamp: DateTime<Utc>,
    pub workspace: WorkspaceId,
    pub wlog_offset: Offset,
    #[serde(default)]
    pub cuds: Vec<Cud>,
    #[serde(default)]
    pub arg_objects: Vec<ArgObject>,
}

impl PLogEvent {
    /// An event with no mutations, stamped with the current time.
    pub fn new(offset: Offset, workspace: WorkspaceId, wlog_offset: Offset) -> Self {
        Self {
            offset,
            timestamp: Utc::now(),
            workspace,
            wlog_offset,
            cuds: Vec::new(),
            arg_objects: Vec::new(),
        }
    }

    pub fn with_cud(mut self, cud: Cud) -> Self {
        self.cuds.push(cud);
        self
    }

    pub fn with_arg_object(mut self, id: RecordId, category: DocCategory) -> Self {
        self.arg_objects.push(ArgObject { id, category });
        self
    }

    /// Every record ID this event consumed from a workspace counter: new
    /// CUDs plus argument objects. Updates reuse existing IDs and are not
    /// reported.
    pub fn used_ids(&self) -> impl Iterator<Item = (IdSequence, RecordId)> + '_ {
        let created = self
            .cuds
            .iter()
            .filter(|cud| cud.is_new)
            .filter_map(|cud| cud.category.id_sequence().map(|seq| (seq, cud.id)));
        // Argument objects always draw from the ordinary sequence.
        let args = self
            .arg_objects
            .iter()
            .map(|obj| (IdSequence::RecId, obj.id));
        created.chain(args)
    }
}
