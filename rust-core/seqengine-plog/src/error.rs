// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors raised while writing or replaying the partition log.

use thiserror::Error;

use crate::ids::{Offset, PartitionId};

/// Errors that can occur during partition log operations.
#[derive(Debug, Error)]
pub enum PLogError {
    /// An I/O error occurred while reading or writing a segment file.
    #[error("PLog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CRC32 checksum mismatch detected during entry validation. Either the
    /// disk corrupted the entry or a crash interrupted its write.
    #[error("CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The log offset recorded in the damaged entry, when readable.
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// The entry header declares a length above the allowed maximum.
    #[error("Entry declares length {length} bytes, exceeding maximum {max_length}")]
    EntryTooLarge { length: u32, max_length: u32 },

    /// The entry ends before all of its fields could be decoded.
    #[error("Unexpected end of entry at byte {0}")]
    UnexpectedEof(u64),

    /// The JSON body of an entry could not be encoded or decoded.
    #[error("JSON error in PLog entry body: {0}")]
    Json(#[from] serde_json::Error),

    /// An event was appended with an offset that does not follow the last
    /// one written.
    #[error("Offset {offset} does not follow last written offset {last}")]
    OffsetRegression { offset: Offset, last: Offset },

    /// The partition directory does not exist or is not accessible.
    #[error("PLog directory not found or inaccessible: {0}")]
    DirectoryNotFound(String),

    /// A read failure produced by a test double or a broken reader.
    #[error("PLog of partition {partition} unavailable: {reason}")]
    Unavailable {
        partition: PartitionId,
        reason: String,
    },

    /// The visitor passed to a read asked to stop with an error.
    #[error("PLog visitor aborted at offset {offset}: {reason}")]
    VisitorAborted { offset: Offset, reason: String },
}

/// Convenience type alias for partition log results.
pub type PLogResult<T> = Result<T, PLogError>;
