// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identifier newtypes shared by the log and the sequencer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A partition: the unit of isolation that owns one log and one sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u64);

/// A workspace inside a partition. [`WorkspaceId::NULL`] addresses
/// partition-scoped rows.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkspaceId(pub u64);

impl WorkspaceId {
    pub const NULL: WorkspaceId = WorkspaceId(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// A position in the partition log or in a workspace log.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(pub u64);

impl Offset {
    /// "No offset": nothing has been allocated yet, or an allocation was
    /// refused.
    pub const NULL: Offset = Offset(0);
    /// The first offset ever handed out.
    pub const FIRST: Offset = Offset(1);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    /// The offset immediately after this one.
    ///
    /// # Panics
    ///
    /// At `u64::MAX`. Wrapping to zero would hand out offsets again.
    pub fn next(self) -> Offset {
        match self.0.checked_add(1) {
            Some(next) => Offset(next),
            None => panic!("offset space exhausted at {}", self.0),
        }
    }
}

/// A record identifier, ordinary or compacting.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const NULL: RecordId = RecordId(0);

    /// # Panics
    ///
    /// At `u64::MAX`.
    pub fn next(self) -> RecordId {
        match self.0.checked_add(1) {
            Some(next) => RecordId(next),
            None => panic!("record id space exhausted at {}", self.0),
        }
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

impl_display!(PartitionId, WorkspaceId, Offset, RecordId);
