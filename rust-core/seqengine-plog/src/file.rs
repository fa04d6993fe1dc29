// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File-backed partition logs rooted at one directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{PLogError, PLogResult};
use crate::ids::{Offset, PartitionId};
use crate::log::{PLogReader, ReadLimit, Visitor};
use crate::reader::read_partition;
use crate::segment::partition_dir;
use crate::writer::{PLogWriter, SyncMode};

/// All partition logs under a root directory, one `p-{pid}` subdirectory
/// each.
#[derive(Debug, Clone)]
pub struct FilePLog {
    root: PathBuf,
}

impl FilePLog {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open the writer of one partition, creating its directory on first
    /// use.
    pub fn writer(&self, pid: PartitionId, sync_mode: SyncMode) -> PLogResult<PLogWriter> {
        PLogWriter::open(partition_dir(&self.root, pid), sync_mode)
    }
}

#[async_trait]
impl PLogReader for FilePLog {
    async fn read_plog(
        &self,
        pid: PartitionId,
        from: Offset,
        limit: ReadLimit,
        visitor: &mut Visitor<'_>,
    ) -> PLogResult<()> {
        let dir = partition_dir(&self.root, pid);
        if !dir.is_dir() {
            return Ok(());
        }

        let events = tokio::task::spawn_blocking(move || read_partition(&dir, from, limit))
            .await
            .map_err(|e| PLogError::Unavailable {
                partition: pid,
                reason: format!("task join: {e}"),
            })??;

        for event in &events {
            visitor(event)?;
        }
        Ok(())
    }
}
