use serde::Serialize;
use tracing::{info, warn};

use crate::core::catalog::FileCatalog;
use crate::core::node::NodeRegistry;
use crate::core::perf::PerformanceTracker;
use crate::core::placement::ReplicaPlacer;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryOutcome {
    Healthy,
    Replicated {
        source: String,
        added: Vec<String>,
    },
    /// Some replicas were placed but the target could not be reached.
    Degraded {
        source: String,
        added: Vec<String>,
        missing: usize,
    },
    /// No online replica is left to copy from.
    Unavailable,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FileRecovery {
    pub file_id: String,
    #[serde(flatten)]
    pub outcome: RecoveryOutcome,
}

/// Brings files back up to the replication factor after nodes disappear.
#[derive(Clone, Debug)]
pub struct RecoveryManager {
    factor: usize,
}

impl RecoveryManager {
    pub fn new(factor: usize) -> Self {
        Self { factor }
    }

    /// Re-checks every file that had a replica on `node_id`.
    pub fn handle_failure(
        &self,
        node_id: &str,
        catalog: &mut FileCatalog,
        registry: &mut NodeRegistry,
        placer: &ReplicaPlacer,
        perf: &PerformanceTracker,
    ) -> Vec<FileRecovery> {
        let affected = catalog.files_with_replica(node_id);
        info!(node_id, files = affected.len(), "checking files after node failure");
        self.repair(&affected, catalog, registry, placer, perf)
    }

    pub fn repair(
        &self,
        file_ids: &[String],
        catalog: &mut FileCatalog,
        registry: &mut NodeRegistry,
        placer: &ReplicaPlacer,
        perf: &PerformanceTracker,
    ) -> Vec<FileRecovery> {
        let mut results = Vec::with_capacity(file_ids.len());

        for file_id in file_ids {
            let Some(file) = catalog.get(file_id) else {
                continue;
            };

            let online = file.online_replicas(registry);
            let outcome = if online.is_empty() {
                warn!(file_id = %file_id, "file unavailable, no online replicas");
                RecoveryOutcome::Unavailable
            } else if online.len() >= self.factor {
                RecoveryOutcome::Healthy
            } else {
                let needed = self.factor - online.len();
                let size = file.file_size;
                let source = online[0].clone();
                let selected =
                    placer.select_replicas(registry, perf, size, needed, &file.replica_nodes);

                let added = match catalog.add_replicas(file_id, selected) {
                    Ok(added) => added,
                    Err(e) => {
                        warn!(file_id = %file_id, "failed to record replicas: {e}");
                        Vec::new()
                    }
                };
                for node_id in &added {
                    registry.add_used_storage(node_id, size);
                }

                if added.len() >= needed {
                    info!(file_id = %file_id, %source, ?added, "scheduled re-replication");
                    RecoveryOutcome::Replicated { source, added }
                } else {
                    let missing = needed - added.len();
                    warn!(file_id = %file_id, %source, ?added, missing, "not enough nodes to re-replicate");
                    RecoveryOutcome::Degraded {
                        source,
                        added,
                        missing,
                    }
                }
            };

            results.push(FileRecovery {
                file_id: file_id.clone(),
                outcome,
            });
        }

        results
    }
}
