// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Errors of the view storage layer.

use thiserror::Error;

/// Failure of a view read or write.
///
/// The sequencer treats every variant as transient: flushes and recovery
/// reads retry until they succeed or the partition shuts down.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A row value could not be encoded, or a stored value could not be
    /// decoded into the requested type.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The backend returned data it cannot vouch for.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A failure injected by [`crate::faulty::FaultyBackend`].
    #[error("injected failure: {0}")]
    Injected(String),
}
