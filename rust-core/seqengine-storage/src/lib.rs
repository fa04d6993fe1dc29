// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequence engine view storage.
//
// The sequencer persists its checkpoints, and the recovery-point store its
// rows, through an ordered key-value view. This crate provides that view as
// the `StorageBackend` trait plus the backends and wrappers the engine and
// its tests run against.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait: point reads, prefix scans and
//   atomic batch writes.
// - [`error`] -- The `StorageError` enum covering all backend failure modes.
// - [`memory`] -- An in-memory `BTreeMap`-based backend.
// - [`typed`] -- A serde-based typed wrapper with namespace prefixing and
//   batched writes.
// - [`metrics`] -- A transparent wrapper that counts operations and batches.
// - [`faulty`] -- A wrapper that injects read/write failures on demand.
//
// # Example
//
// ```rust
// use seqengine_storage::backend::StorageBackend;
// use seqengine_storage::memory::InMemoryBackend;
// use seqengine_storage::typed::TypedStore;
// use seqengine_storage::metrics::MetricsBackend;
//
// # tokio_test::block_on(async {
// let metered = MetricsBackend::new(InMemoryBackend::new());
// let store = TypedStore::new(metered, "sys.sequences");
//
// store
//     .put_batch(&[("1:10".to_string(), 7u64), ("1:11".to_string(), 9u64)])
//     .await
//     .unwrap();
//
// let rows: Vec<(String, u64)> = store.scan_prefix("1:").await.unwrap();
// assert_eq!(rows.len(), 2);
// assert_eq!(store.backend().stats().await.batch_put_count, 1);
// # });
// ```

pub mod backend;
pub mod error;
pub mod faulty;
pub mod memory;
pub mod metrics;
pub mod typed;

// Persistent backend, behind the `redb-backend` feature.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use faulty::FaultyBackend;
pub use memory::InMemoryBackend;
pub use metrics::{BackendStats, MetricsBackend};
pub use typed::TypedStore;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
