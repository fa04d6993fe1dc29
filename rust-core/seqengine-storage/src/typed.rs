// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed storage wrapper.
//
// Provides a serde-based interface on top of any `StorageBackend`. Values
// are serialized as JSON and all keys are prefixed with a namespace
// (`"{namespace}:"`), so the checkpoint view and the recovery-point view can
// share one physical backend without key collisions.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// A typed, namespaced view over a [`StorageBackend`].
///
/// # Example
///
/// ```rust
/// use seqengine_storage::memory::InMemoryBackend;
/// use seqengine_storage::typed::TypedStore;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct Row { last: u64 }
///
/// # tokio_test::block_on(async {
/// let store = TypedStore::new(InMemoryBackend::new(), "sys.sequences");
///
/// store.put("1:0:plog", &Row { last: 42 }).await.unwrap();
///
/// let row: Row = store.get("1:0:plog").await.unwrap().unwrap();
/// assert_eq!(row, Row { last: 42 });
/// # });
/// ```
#[derive(Clone)]
pub struct TypedStore<B: StorageBackend> {
    backend: B,
    namespace: String,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Create a new typed store wrapping `backend` with the given namespace.
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    /// Return a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the namespace prefix used by this store.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn prefixed_key(&self, key: &str) -> Vec<u8> {
        format!("{}:{}", self.namespace, key).into_bytes()
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to serialize value for key '{}': {}",
                key, err
            ))
        })
    }

    fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to deserialize value for key '{}': {}",
                key, err
            ))
        })
    }

    /// Retrieve and deserialize a value by its logical key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(&self.prefixed_key(key)).await? {
            Some(bytes) => Ok(Some(Self::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value under the given logical key.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = Self::encode(key, value)?;
        self.backend.put(&self.prefixed_key(key), &bytes).await
    }

    /// Serialize every `(key, value)` pair and write them in one atomic
    /// backend batch.
    ///
    /// Serialization happens before anything is written, so a value that
    /// fails to encode leaves the store untouched.
    pub async fn put_batch<T: Serialize>(&self, rows: &[(String, T)]) -> Result<(), StorageError> {
        let mut encoded = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            encoded.push((self.prefixed_key(key), Self::encode(key, value)?));
        }
        let entries: Vec<(&[u8], &[u8])> = encoded
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
            .collect();
        self.backend.batch_put(&entries).await
    }

    /// Return every entry of this namespace whose logical key starts with
    /// `key_prefix`, as deserialized (logical key, value) pairs in key order.
    pub async fn scan_prefix<T: DeserializeOwned>(
        &self,
        key_prefix: &str,
    ) -> Result<Vec<(String, T)>, StorageError> {
        let ns_prefix_len = self.namespace.len() + 1;
        let raw = self
            .backend
            .scan_prefix(&self.prefixed_key(key_prefix), usize::MAX)
            .await?;

        let mut results = Vec::with_capacity(raw.len());
        for (raw_key, raw_value) in raw {
            let logical_key = String::from_utf8_lossy(&raw_key[ns_prefix_len..]).to_string();
            let value = Self::decode(&logical_key, &raw_value)?;
            results.push((logical_key, value));
        }
        Ok(results)
    }
}
