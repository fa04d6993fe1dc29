// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// redb-backed persistent view storage.
//
// Checkpoint and recovery-point rows live in a single redb table. Every
// write, including a single `put`, goes through one write transaction, so a
// flusher batch either lands completely or not at all. redb calls are
// blocking and run on the tokio blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// The single table holding all view rows.
const VIEW_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("views");

type Row = (Vec<u8>, Vec<u8>);

/// A persistent [`StorageBackend`] stored in one redb database file.
///
/// ```rust,no_run
/// use seqengine_storage::redb_backend::RedbBackend;
/// use seqengine_storage::backend::StorageBackend;
///
/// # tokio_test::block_on(async {
/// let store = RedbBackend::open("/tmp/seqengine-views.redb").unwrap();
/// store.put(b"sys.prp:1", b"{}").await.unwrap();
/// assert!(store.get(b"sys.prp:1").await.unwrap().is_some());
/// # });
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create the database file at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::BackendUnavailable(format!("create {}: {e}", parent.display()))
            })?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "opened redb view store");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a blocking closure against the database on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }

    /// Insert all rows inside one write transaction.
    fn write_rows(db: &Database, rows: &[Row]) -> Result<(), StorageError> {
        let txn = db
            .begin_write()
            .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
        {
            let mut table = txn
                .open_table(VIEW_TABLE)
                .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
            for (k, v) in rows {
                table
                    .insert(k.as_slice(), v.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            }
        }
        txn.commit()
            .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend").field("path", &self.path).finish()
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            // The table does not exist until the first write.
            let Ok(table) = txn.open_table(VIEW_TABLE) else {
                return Ok(None);
            };
            table
                .get(key.as_slice())
                .map(|v| v.map(|v| v.value().to_vec()))
                .map_err(|e| StorageError::CorruptedData(format!("get: {e}")))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let row = vec![(key.to_vec(), value.to_vec())];
        self.blocking(move |db| Self::write_rows(db, &row)).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let prefix = prefix.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let Ok(table) = txn.open_table(VIEW_TABLE) else {
                return Ok(Vec::new());
            };

            let iter = table
                .range(prefix.as_slice()..)
                .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;

            let mut rows = Vec::new();
            for entry in iter {
                let (k, v) =
                    entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                let k = k.value().to_vec();
                if !k.starts_with(&prefix) || rows.len() >= limit {
                    break;
                }
                rows.push((k, v.value().to_vec()));
            }
            Ok(rows)
        })
        .await
    }

    async fn batch_put(&self, entries: &[(&[u8], &[u8])]) -> Result<(), StorageError> {
        let rows: Vec<Row> = entries
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        let count = rows.len();
        self.blocking(move |db| Self::write_rows(db, &rows)).await?;
        debug!(rows = count, "redb batch committed");
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}
