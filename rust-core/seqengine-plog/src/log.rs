// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The replay interface recovery consumes.

use async_trait::async_trait;

use crate::error::PLogResult;
use crate::event::PLogEvent;
use crate::ids::{Offset, PartitionId};

/// How many events a read may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLimit {
    /// Every committed event from the start offset on.
    ToTheEnd,
    /// At most this many events.
    Count(usize),
}

impl ReadLimit {
    /// Whether `visited` events exhaust this limit.
    pub fn reached(self, visited: usize) -> bool {
        match self {
            Self::ToTheEnd => false,
            Self::Count(n) => visited >= n,
        }
    }
}

/// Callback invoked once per event. Returning an error aborts the read.
pub type Visitor<'a> = dyn FnMut(&PLogEvent) -> PLogResult<()> + Send + 'a;

/// Bounded replay over a partition log.
#[async_trait]
pub trait PLogReader: Send + Sync {
    /// Visit the committed events of `pid` with `offset >= from`, in offset
    /// order. A partition that never wrote anything has an empty log.
    async fn read_plog(
        &self,
        pid: PartitionId,
        from: Offset,
        limit: ReadLimit,
        visitor: &mut Visitor<'_>,
    ) -> PLogResult<()>;
}
