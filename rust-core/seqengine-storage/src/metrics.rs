// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for storage backends.
//
// Wraps any `StorageBackend` and counts operations, batch writes and rows
// written. The flusher's write amplification is measured here: one
// auto-flush must show up as exactly one `batch_put` call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Accumulated statistics for a storage backend.
///
/// All counters are monotonically increasing until [`MetricsBackend::reset_stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStats {
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// Number of single-key `put` operations performed.
    pub put_count: u64,
    /// Number of `scan_prefix` operations performed.
    pub scan_count: u64,
    /// Number of `batch_put` calls, successful or not.
    pub batch_put_count: u64,
    /// Rows written by successful `put` and `batch_put` calls.
    pub rows_written: u64,
    /// Write calls that returned an error.
    pub failed_writes: u64,
    /// Cumulative wall-clock latency of all write calls, in milliseconds.
    pub write_latency_sum_ms: f64,
}

/// A storage backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use seqengine_storage::memory::InMemoryBackend;
/// use seqengine_storage::metrics::MetricsBackend;
/// use seqengine_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let metered = MetricsBackend::new(InMemoryBackend::new());
///
/// metered.batch_put(&[(b"a" as &[u8], b"1" as &[u8]), (b"b", b"2")]).await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.batch_put_count, 1);
/// assert_eq!(stats.rows_written, 2);
/// # });
/// ```
pub struct MetricsBackend<B: StorageBackend> {
    inner: B,
    stats: Arc<RwLock<BackendStats>>,
}

impl<B: StorageBackend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> BackendStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn record_write(&self, rows: usize, started: Instant, ok: bool) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut s = self.stats.write().await;
        s.write_latency_sum_ms += elapsed_ms;
        if ok {
            s.rows_written += rows as u64;
        } else {
            s.failed_writes += 1;
        }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for MetricsBackend<B> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.stats.write().await.get_count += 1;
        self.inner.get(key).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.stats.write().await.put_count += 1;
        let started = Instant::now();
        let result = self.inner.put(key, value).await;
        self.record_write(1, started, result.is_ok()).await;
        result
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.stats.write().await.scan_count += 1;
        self.inner.scan_prefix(prefix, limit).await
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        self.stats.write().await.batch_put_count += 1;
        let started = Instant::now();
        let result = self.inner.batch_put(entries).await;
        self.record_write(entries.len(), started, result.is_ok()).await;
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
