// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage backend.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock`; the ordering gives prefix
// scans for free. Clones share the same map, so a test can keep a handle to
// the view a sequencer writes to and inspect the rows afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// An in-memory storage backend backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is lost on drop.
///
/// # Example
///
/// ```rust
/// use seqengine_storage::memory::InMemoryBackend;
/// use seqengine_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.put(b"hello", b"world").await.unwrap();
/// let val = store.get(b"hello").await.unwrap();
/// assert_eq!(val, Some(b"world".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.write().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let map = self.data.read().await;
        let results = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        // One write guard for the whole batch: readers never observe a
        // partially applied batch.
        let mut map = self.data.write().await;
        for (key, value) in entries {
            map.insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let backend = InMemoryBackend::new();
        assert!(backend.is_empty().await);
        assert_eq!(backend.get(b"k").await.unwrap(), None);

        backend.put(b"k", b"1").await.unwrap();
        backend.put(b"k", b"2").await.unwrap();

        assert_eq!(backend.get(b"k").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_scan_prefix_groups_partition_rows() {
        let backend = InMemoryBackend::new();
        backend.put(b"p1:w0", b"a").await.unwrap();
        backend.put(b"p1:w7", b"b").await.unwrap();
        backend.put(b"p2:w0", b"c").await.unwrap();

        let rows = backend.scan_prefix(b"p1:", usize::MAX).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, b"p1:w0".to_vec());
        assert_eq!(rows[1].0, b"p1:w7".to_vec());

        let limited = backend.scan_prefix(b"p", 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        assert!(backend.scan_prefix(b"p3:", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_put_overwrites_rows() {
        let backend = InMemoryBackend::new();
        backend.put(b"00001:seq", b"3").await.unwrap();
        backend
            .batch_put(&[(b"00001:seq" as &[u8], b"10" as &[u8]), (b"00001:wlog", b"20")])
            .await
            .unwrap();

        assert_eq!(backend.len().await, 2);
        let rows = backend.scan_prefix(b"00001:", usize::MAX).await.unwrap();
        assert_eq!(rows[0], (b"00001:seq".to_vec(), b"10".to_vec()));
        assert_eq!(rows[1], (b"00001:wlog".to_vec(), b"20".to_vec()));
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();

        backend.put(b"shared", b"data").await.unwrap();
        assert_eq!(clone.get(b"shared").await.unwrap(), Some(b"data".to_vec()));
        assert_eq!(clone.name(), "in-memory");
    }
}
