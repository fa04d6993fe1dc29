// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure-injecting wrapper for storage backends.
//
// Delegates to an inner backend but fails a scheduled number of reads
// (`get`, `scan_prefix`) or writes (`put`, `batch_put`) with
// `StorageError::Injected`. Used to exercise the retry loops of the flusher
// and of recovery without a real flaky disk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Sentinel budget meaning "fail until healed".
const FOREVER: usize = usize::MAX;

/// A storage backend wrapper that fails operations on demand.
///
/// Clones share the same failure budgets, so a test can keep one handle to
/// schedule faults while the engine owns another.
pub struct FaultyBackend<B: StorageBackend> {
    inner: Arc<B>,
    read_failures: Arc<AtomicUsize>,
    write_failures: Arc<AtomicUsize>,
}

impl<B: StorageBackend> Clone for FaultyBackend<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            read_failures: Arc::clone(&self.read_failures),
            write_failures: Arc::clone(&self.write_failures),
        }
    }
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wrap `inner`; no failures are scheduled initially.
    pub fn new(inner: B) -> Self {
        Self {
            inner: Arc::new(inner),
            read_failures: Arc::new(AtomicUsize::new(0)),
            write_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `count` read operations.
    pub fn fail_next_reads(&self, count: usize) {
        self.read_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` write operations.
    pub fn fail_next_writes(&self, count: usize) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every read and write until [`heal`](Self::heal) is called.
    pub fn fail_forever(&self) {
        self.read_failures.store(FOREVER, Ordering::SeqCst);
        self.write_failures.store(FOREVER, Ordering::SeqCst);
    }

    /// Cancel all scheduled failures.
    pub fn heal(&self) {
        self.read_failures.store(0, Ordering::SeqCst);
        self.write_failures.store(0, Ordering::SeqCst);
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn check(budget: &AtomicUsize, op: &str) -> Result<(), StorageError> {
        let consumed = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            FOREVER => Some(FOREVER),
            n => Some(n - 1),
        });
        match consumed {
            Ok(_) => Err(StorageError::Injected(op.to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Self::check(&self.read_failures, "get")?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Self::check(&self.write_failures, "put")?;
        self.inner.put(key, value).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Self::check(&self.read_failures, "scan_prefix")?;
        self.inner.scan_prefix(prefix, limit).await
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        Self::check(&self.write_failures, "batch_put")?;
        self.inner.batch_put(entries).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    #[tokio::test]
    async fn test_scheduled_write_failures_are_consumed() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        backend.fail_next_writes(2);

        assert!(matches!(
            backend.put(b"k", b"v").await,
            Err(StorageError::Injected(_))
        ));
        assert!(backend.batch_put(&[(b"k" as &[u8], b"v" as &[u8])]).await.is_err());
        backend.put(b"k", b"v").await.unwrap();

        // Reads were never scheduled to fail.
        assert_eq!(backend.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_fail_forever_until_healed() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        backend.fail_forever();

        for _ in 0..5 {
            assert!(backend.scan_prefix(b"", 10).await.is_err());
            assert!(backend.put(b"k", b"v").await.is_err());
        }

        backend.heal();
        backend.put(b"k", b"v").await.unwrap();
        assert_eq!(backend.scan_prefix(b"", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_budget() {
        let backend = FaultyBackend::new(InMemoryBackend::new());
        let handle = backend.clone();
        handle.fail_next_reads(1);

        assert!(backend.get(b"k").await.is_err());
        assert_eq!(backend.get(b"k").await.unwrap(), None);
    }
}
