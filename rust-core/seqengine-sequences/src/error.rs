// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error types for the sequence engine.
//
// Only environmental failures are errors. Calling the sequencer in the wrong
// state is a caller bug and panics instead.

use seqengine_plog::PLogError;
use seqengine_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequenceError {
    /// The checkpoint or recovery-point view failed.
    #[error("view storage error: {0}")]
    Storage(#[from] StorageError),

    /// The partition log could not be replayed.
    #[error("partition log error: {0}")]
    Log(#[from] PLogError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A stored row has a key or value this engine cannot interpret.
    #[error("corrupted row '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

impl SequenceError {
    /// Whether retrying the same operation can succeed without someone
    /// repairing stored data or configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, SequenceError::Storage(_) | SequenceError::Log(_))
    }
}

pub type SequenceResult<T> = Result<T, SequenceError>;
