// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Partition log (PLog) crate.
//
// The partition log is the authoritative, append-only record of committed
// events of one partition. The sequencer never trusts its own checkpoints
// over it: after a crash, counters are rebuilt by replaying this log.
//
// # Architecture
//
// Each partition owns a directory of **segment files**. Each segment is an
// append-only binary file containing length-prefixed, CRC32-protected
// entries, rotated once it exceeds a configurable maximum size (default
// 64 MiB). See [`entry`] for the on-disk layout.
//
// Recovery consumes the log through the [`PLogReader`] trait, implemented
// by [`FilePLog`] and by the in-memory [`InMemoryPLog`].
//
// ## Usage
//
// ```no_run
// use seqengine_plog::{FilePLog, PLogEvent, Offset, PartitionId, WorkspaceId, SyncMode};
//
// let log = FilePLog::new("/tmp/seqengine-plog");
// let mut writer = log.writer(PartitionId(1), SyncMode::Fsync).unwrap();
// writer
//     .append(&PLogEvent::new(Offset(1), WorkspaceId(10), Offset(1)))
//     .unwrap();
// ```

pub mod entry;
pub mod error;
pub mod event;
pub mod file;
pub mod ids;
pub mod log;
pub mod memory;
pub mod reader;
pub mod segment;
pub mod writer;

pub use error::{PLogError, PLogResult};
pub use event::{ArgObject, Cud, DocCategory, IdSequence, PLogEvent};
pub use file::FilePLog;
pub use ids::{Offset, PartitionId, RecordId, WorkspaceId};
pub use log::{PLogReader, ReadLimit, Visitor};
pub use memory::InMemoryPLog;
pub use segment::{SegmentInfo, DEFAULT_MAX_SEGMENT_SIZE};
pub use writer::{PLogWriter, SyncMode};
