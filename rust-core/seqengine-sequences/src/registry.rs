// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sequencers of every partition deployed on this node.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use seqengine_plog::{PLogReader, PartitionId};
use seqengine_storage::StorageBackend;

use crate::config::SequencerConfig;
use crate::error::SequenceResult;
use crate::sequencer::Sequencer;

/// Owns one [`Sequencer`] per deployed partition. All of them share the
/// checkpoint storage, the log reader and the configuration.
pub struct SequencerRegistry {
    checkpoints: Arc<dyn StorageBackend>,
    log: Arc<dyn PLogReader>,
    config: SequencerConfig,
    sequencers: RwLock<HashMap<PartitionId, Arc<Sequencer>>>,
}

impl SequencerRegistry {
    pub fn new(
        checkpoints: Arc<dyn StorageBackend>,
        log: Arc<dyn PLogReader>,
        config: SequencerConfig,
    ) -> SequenceResult<Self> {
        config.validate()?;
        Ok(Self {
            checkpoints,
            log,
            config,
            sequencers: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Sequencer of `pid`, created and put into recovery on first use.
    pub async fn deploy(&self, pid: PartitionId) -> Arc<Sequencer> {
        if let Some(existing) = self.get(pid).await {
            return existing;
        }

        let mut sequencers = self.sequencers.write().await;
        Arc::clone(sequencers.entry(pid).or_insert_with(|| {
            let sequencer = Sequencer::new(
                pid,
                Arc::clone(&self.checkpoints),
                Arc::clone(&self.log),
                self.config.clone(),
            );
            sequencer.recovery();
            info!(partition = %pid, "Deployed sequencer");
            Arc::new(sequencer)
        }))
    }

    pub async fn get(&self, pid: PartitionId) -> Option<Arc<Sequencer>> {
        self.sequencers.read().await.get(&pid).cloned()
    }

    /// Deployed partitions in ascending order.
    pub async fn partitions(&self) -> Vec<PartitionId> {
        let mut pids: Vec<PartitionId> = self.sequencers.read().await.keys().copied().collect();
        pids.sort();
        pids
    }

    /// Remove the sequencer of `pid` and shut it down. Returns `false` when
    /// the partition was not deployed.
    pub async fn undeploy(&self, pid: PartitionId) -> bool {
        let removed = self.sequencers.write().await.remove(&pid);
        match removed {
            Some(sequencer) => {
                sequencer.shutdown().await;
                info!(partition = %pid, "Undeployed sequencer");
                true
            }
            None => false,
        }
    }

    /// Shut down every deployed sequencer.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Sequencer>> = self
            .sequencers
            .write()
            .await
            .drain()
            .map(|(_, sequencer)| sequencer)
            .collect();
        for sequencer in drained {
            sequencer.shutdown().await;
        }
    }
}
