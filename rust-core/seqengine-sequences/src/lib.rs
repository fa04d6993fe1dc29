// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequence & recovery-point engine.
//
// Each partition has a sequencer that hands out PLog offsets, WLog offsets
// and record IDs to the command pipeline. Finished events are checkpointed
// write-behind to the `sys.sequences` view. After a restart, or when an
// event is cancelled, the counters are rebuilt from the checkpoint plus the
// tail of the partition log. Independently, [`Recovers`] persists how far
// consumers have incorporated the log.
//
// # Modules
//
// - [`sequencer`] -- The `Sequencer` state machine.
// - [`registry`] -- One sequencer per deployed partition.
// - [`recovery`] -- Checkpoint load plus log replay.
// - [`view`] -- Row layout of the checkpoint view.
// - [`recovers`] -- Partition recovery points in the `sys.prp` view.
// - [`config`] -- Flush threshold and retry backoff.

pub mod config;
pub mod counters;
pub mod error;
mod flusher;
pub mod recovers;
pub mod recovery;
pub mod registry;
pub mod sequencer;
pub mod view;

pub use config::SequencerConfig;
pub use counters::Counters;
pub use error::{SequenceError, SequenceResult};
pub use recovers::{PartitionRecoveryPoint, Recovers, WorkspaceRecoveryPoint};
pub use registry::SequencerRegistry;
pub use sequencer::{Sequencer, SequencerStatus};
pub use view::{CheckpointView, SequenceKind};
